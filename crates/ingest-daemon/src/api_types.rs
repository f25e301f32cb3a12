//! Request and response types for all ingest-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
 pub ok: bool,
 pub service: &'static str,
 pub version: &'static str,
}

// ---------------------------------------------------------------------------
// /v1/status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
 pub db_ok: bool,
 pub daemon_uptime_secs: u64,
 pub cache_entries: usize,
}

// ---------------------------------------------------------------------------
// Error body
// ---------------------------------------------------------------------------

/// Mirrors `ingest_schemas::ApiError`; redeclared here so handlers never
/// echo an internal `anyhow`/db error string on a 500.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
 pub code: String,
 pub message: String,
}

// ---------------------------------------------------------------------------
// POST /v1/scheduler/run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerRunRequest {
 pub feed: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SchedulerRunResponse {
 CompletedImmediately { run_id: Uuid },
 Enqueued { run_id: Uuid, partition_count: usize },
}

// ---------------------------------------------------------------------------
// POST /v1/consolidate/run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ConsolidateRunRequest {
 pub run_id: Uuid,
 pub feed: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsolidateRunResponse {
 pub rows_consolidated: i64,
 pub soft_deleted: u64,
 pub new_version: Option<i64>,
}

// ---------------------------------------------------------------------------
// POST /v1/monitor/tick
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorTickRequest {
 pub feed: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorTickResponse {
 pub stalled: usize,
 pub retried: usize,
 pub claims_swept: u64,
}

// ---------------------------------------------------------------------------
// POST /v1/runs/{run_id}/cancel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CancelRunResponse {
 pub run_id: Uuid,
 pub partitions_cancelled: u64,
}

// ---------------------------------------------------------------------------
// GET /v1/diamonds/search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct DiamondSearchQuery {
 pub feed: Option<String>,
 pub shape: Option<String>,
 pub min_price_minor: Option<i64>,
 pub max_price_minor: Option<i64>,
 #[serde(default)]
 pub limit: Option<i64>,
 #[serde(default)]
 pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiamondSearchResponse {
 pub rows: Vec<ingest_schemas::CanonicalDiamond>,
 pub cache_hit: bool,
}
