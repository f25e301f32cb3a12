//! Row-shaped domain types (DATA MODEL).
//!
//! These mirror the relational schema 1:1 so `sqlx::FromRow` can decode them
//! without an intermediate DTO layer, the same convention `mqk-db` used for
//! its `runs`/`md_bars` rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single ingestion attempt for one feed ("Run").
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Run {
 pub run_id: Uuid,
 pub feed: String,
 pub run_type: RunType,
 pub expected_workers: i32,
 pub completed_workers: i32,
 pub failed_workers: i32,
 pub watermark_before: Option<DateTime<Utc>>,
 pub watermark_after: DateTime<Utc>,
 pub started_at: DateTime<Utc>,
 pub completed_at: Option<DateTime<Utc>>,
}

impl Run {
 /// Invariant : completed + failed <= expected.
 pub fn is_over_budget(&self) -> bool {
 self.completed_workers + self.failed_workers > self.expected_workers
 }

 /// A run terminates when completed+failed reaches expected workers.
 pub fn is_terminal(&self) -> bool {
 self.completed_workers + self.failed_workers >= self.expected_workers
 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "run_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunType {
 Full,
 Incremental,
}

/// A disjoint price-bounded slice of the feed within one run (/// "Partition"). Composite key is `(run_id, partition_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Partition {
 pub run_id: Uuid,
 pub partition_id: i32,
 pub min_price: i64,
 pub max_price: i64,
 pub total_records: i64,
 pub next_offset: i64,
 pub status: PartitionStatus,
 pub last_heartbeat: DateTime<Utc>,
 pub retry_count: i32,
 /// Opaque JSON replay payload for re-enqueueing this partition's work item.
 pub work_item_payload: Value,
 pub error_message: Option<String>,
}

impl Partition {
 /// Invariant (#1): next_offset <= total_records.
 pub fn offset_in_bounds(&self) -> bool {
 self.next_offset <= self.total_records
 }

 pub fn is_done(&self) -> bool {
 self.next_offset >= self.total_records
 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "partition_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PartitionStatus {
 Pending,
 Running,
 Completed,
 Failed,
 Stalled,
}

impl PartitionStatus {
 /// Terminal states are sticky until an explicit admin reset.
 pub fn is_terminal(&self) -> bool {
 matches!(self, PartitionStatus::Completed | PartitionStatus::Failed)
 }
}

/// A vendor record captured verbatim plus identity keys ("Raw
/// row"). Unique on `(feed, supplier_stone_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RawRow {
 pub feed: String,
 pub supplier_stone_id: String,
 pub offer_id: String,
 pub payload: Value,
 pub consolidation_status: ConsolidationStatus,
 pub claim_expiry: Option<DateTime<Utc>>,
 pub source_updated_at: Option<DateTime<Utc>>,
 pub created_at: DateTime<Utc>,
 pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "consolidation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConsolidationStatus {
 Pending,
 Claimed,
 Done,
}

/// The normalized record serving search ("Canonical diamond").
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CanonicalDiamond {
 pub id: Uuid,
 pub feed: String,
 pub supplier_stone_id: String,
 pub offer_id: String,
 pub shape: Option<String>,
 pub carat: Option<f64>,
 pub color: Option<String>,
 pub clarity: Option<String>,
 pub cut: Option<String>,
 /// Integer minor units (cents) — never a float, so partition/price
 /// comparisons stay exact.
 pub price_minor: i64,
 pub availability: Option<String>,
 pub status: DiamondStatus,
 pub source_updated_at: DateTime<Utc>,
 pub created_at: DateTime<Utc>,
 pub updated_at: DateTime<Utc>,
 pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "diamond_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DiamondStatus {
 Active,
 Deleted,
}

/// Per-feed object containing the last-ingested-through timestamp
/// ("Watermark"), stored as `watermarks/{feed}.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Watermark {
 pub last_updated_at: DateTime<Utc>,
 pub last_run_id: Option<Uuid>,
 pub last_run_completed_at: Option<DateTime<Utc>>,
}

/// Per-feed monotonically increasing integer gating cache validity
/// ("Dataset version").
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DatasetVersion {
 pub feed: String,
 pub version: i64,
 pub updated_at: DateTime<Utc>,
}

/// Per-key fixed-window token bucket row, shared across all worker replicas
/// ("Rate-limit row").
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RateLimitRow {
 pub key: String,
 pub window_start: DateTime<Utc>,
 pub request_count: i32,
 pub last_request_at: DateTime<Utc>,
}

/// Generalized reapply/monitor job : originally pricing-rule
/// reapplication, generalized here to ingestion stall detection.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MonitorJob {
 pub job_id: Uuid,
 pub kind: MonitorJobKind,
 pub status: MonitorJobStatus,
 pub retry_count: i32,
 pub next_retry_at: Option<DateTime<Utc>>,
 pub last_heartbeat: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "monitor_job_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MonitorJobKind {
 PartitionStallCheck,
 ConsolidationClaimSweep,
 PricingRuleReapply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "monitor_job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MonitorJobStatus {
 Pending,
 Running,
 Completed,
 Failed,
 Stalled,
}
