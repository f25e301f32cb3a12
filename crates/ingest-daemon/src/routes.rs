//! Axum router and all HTTP handlers for ingest-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::{convert::Infallible, sync::Arc};

use axum::{
 extract::{Query, State},
 http::{HeaderMap, HeaderValue, StatusCode},
 response::{
 sse::{Event, KeepAlive, Sse},
 IntoResponse, Response,
 },
 routing::{get, post},
 Json, Router,
};
use futures_util::{Stream, StreamExt};
use ingest_db::DiamondSearch;
use ingest_schemas::IngestError;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::{
 api_types::{
 CancelRunResponse, ConsolidateRunRequest, ConsolidateRunResponse, DiamondSearchQuery,
 DiamondSearchResponse, ErrorResponse, HealthResponse, MonitorTickRequest,
 MonitorTickResponse, SchedulerRunRequest, SchedulerRunResponse, StatusResponse,
 },
 state::{uptime_secs, AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
 Router::new()
 .route("/v1/health", get(health))
 .route("/v1/status", get(status_handler))
 .route("/v1/stream", get(stream))
 .route("/v1/scheduler/run", post(scheduler_run))
 .route("/v1/consolidate/run", post(consolidate_run))
 .route("/v1/monitor/tick", post(monitor_tick))
 .route("/v1/runs/:run_id/cancel", post(cancel_run))
 .route("/v1/diamonds/search", get(diamonds_search))
 .with_state(state)
}

fn ingest_error_response(err: IngestError) -> Response {
 let (status, code) = match &err {
 IngestError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
 IngestError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
 IngestError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
 IngestError::RateLimitExceeded(_) => (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded"),
 IngestError::Transient(_) | IngestError::Stalled(_) => (StatusCode::SERVICE_UNAVAILABLE, "transient"),
 IngestError::Fatal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "fatal"),
 };
 // Internal reason is logged but never echoed past its error kind.
 tracing::warn!(error = %err, "request failed");
 (status,
 Json(ErrorResponse {
 code: code.to_string(),
 message: err.to_string(),
 }))
 .into_response()
}

fn anyhow_error_response(err: anyhow::Error) -> Response {
 tracing::error!(error = %err, "request failed");
 (StatusCode::INTERNAL_SERVER_ERROR,
 Json(ErrorResponse {
 code: "internal".to_string(),
 message: "internal error".to_string(),
 }))
 .into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
 (StatusCode::OK,
 Json(HealthResponse {
 ok: true,
 service: st.build().service,
 version: st.build().version,
 }))
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> Response {
 match ingest_db::status(&st.pool).await {
 Ok(db_status) => (StatusCode::OK,
 Json(StatusResponse {
 db_ok: db_status.ok(),
 daemon_uptime_secs: uptime_secs,
 cache_entries: st.cache.len(),
 }))
 .into_response(),
 Err(e) => anyhow_error_response(e),
 }
}

// ---------------------------------------------------------------------------
// POST /v1/scheduler/run
// ---------------------------------------------------------------------------

pub(crate) async fn scheduler_run(State(st): State<Arc<AppState>>,
 Json(req): Json<SchedulerRunRequest>) -> Response {
 let Some(adapter) = st.feeds.get(&req.feed) else {
 return ingest_error_response(IngestError::Validation(format!("unknown feed {}", req.feed)));
 };

 let outcome = ingest_scheduler::run_once(&st.pool,
 st.watermark_store.as_ref(),
 adapter,
 st.work_items.as_ref(),
 &st.scheduler_config)
 .await;

 match outcome {
 Ok(ingest_scheduler::RunOutcome::CompletedImmediately { run_id }) => {
 let _ = st.bus.send(BusMsg::RunCompleted { run_id, partitions: 0 });
 (StatusCode::OK,
 Json(SchedulerRunResponse::CompletedImmediately { run_id }))
 .into_response()
 }
 Ok(ingest_scheduler::RunOutcome::Enqueued { run_id, partition_count }) => {
 let _ = st.bus.send(BusMsg::RunStarted {
 run_id,
 feed: req.feed.clone(),
 });
 (StatusCode::ACCEPTED,
 Json(SchedulerRunResponse::Enqueued { run_id, partition_count }))
 .into_response()
 }
 Err(e) => ingest_error_response(e),
 }
}

// ---------------------------------------------------------------------------
// POST /v1/consolidate/run
// ---------------------------------------------------------------------------

pub(crate) async fn consolidate_run(State(st): State<Arc<AppState>>,
 Json(req): Json<ConsolidateRunRequest>) -> Response {
 let Some(adapter) = st.feeds.get(&req.feed) else {
 return ingest_error_response(IngestError::Validation(format!("unknown feed {}", req.feed)));
 };

 let msg = ingest_schemas::ConsolidateMsg {
 run_id: req.run_id,
 feed: req.feed.clone(),
 };

 match ingest_consolidator::consolidate(&st.pool,
 adapter,
 st.watermark_store.as_ref(),
 &msg,
 &ingest_consolidator::ConsolidatorConfig::default())
 .await
 {
 Ok(report) => {
 let _ = st.bus.send(BusMsg::ConsolidationFinished {
 run_id: req.run_id,
 rows: report.rows_consolidated,
 soft_deleted: report.soft_deleted,
 });
 (StatusCode::OK,
 Json(ConsolidateRunResponse {
 rows_consolidated: report.rows_consolidated,
 soft_deleted: report.soft_deleted,
 new_version: report.new_version,
 }))
 .into_response()
 }
 Err(e) => ingest_error_response(e),
 }
}

// ---------------------------------------------------------------------------
// POST /v1/monitor/tick
// ---------------------------------------------------------------------------

pub(crate) async fn monitor_tick(State(st): State<Arc<AppState>>,
 Json(req): Json<MonitorTickRequest>) -> Response {
 match ingest_monitor::run_once(&st.pool,
 &req.feed,
 st.work_items.as_ref(),
 &ingest_monitor::MonitorConfig::default())
 .await
 {
 Ok(report) => {
 if report.retried > 0 {
 let _ = st.bus.send(BusMsg::PartitionsRetried {
 feed: req.feed.clone(),
 count: report.retried,
 });
 }
 (StatusCode::OK,
 Json(MonitorTickResponse {
 stalled: report.stalled,
 retried: report.retried,
 claims_swept: report.claims_swept,
 }))
 .into_response()
 }
 Err(e) => ingest_error_response(e),
 }
}

// ---------------------------------------------------------------------------
// POST /v1/runs/{run_id}/cancel
// ---------------------------------------------------------------------------

pub(crate) async fn cancel_run(State(st): State<Arc<AppState>>,
 axum::extract::Path(run_id): axum::extract::Path<Uuid>) -> Response {
 match ingest_db::cancel_run(&st.pool, run_id).await {
 Ok(partitions_cancelled) => (StatusCode::OK,
 Json(CancelRunResponse {
 run_id,
 partitions_cancelled,
 }))
 .into_response(),
 Err(e) => anyhow_error_response(e),
 }
}

// ---------------------------------------------------------------------------
// GET /v1/diamonds/search
// ---------------------------------------------------------------------------

const DEFAULT_SEARCH_LIMIT: i64 = 50;

pub(crate) async fn diamonds_search(State(st): State<Arc<AppState>>,
 Query(q): Query<DiamondSearchQuery>) -> Response {
 let limit = q.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
 let offset = q.offset.unwrap_or(0);

 // Pagination/sort keys are deliberately excluded from the cache key
 // : only the filter shape gates a cache hit.
 let key_params = ingest_cache::CacheKeyParams {
 feed: q.feed.clone(),
 shape: q.shape.clone(),
 min_price_minor: q.min_price_minor,
 max_price_minor: q.max_price_minor,
 };

 if offset == 0 {
 if let Some(cached) = st.cache.get(&key_params) {
 if let Ok(rows) = serde_json::from_value::<Vec<ingest_schemas::CanonicalDiamond>>(cached) {
 return (StatusCode::OK,
 Json(DiamondSearchResponse { rows, cache_hit: true }))
 .into_response();
 }
 }
 }

 let search = DiamondSearch {
 feed: q.feed.clone(),
 shape: q.shape.clone(),
 min_price_minor: q.min_price_minor,
 max_price_minor: q.max_price_minor,
 limit,
 offset,
 };

 match ingest_db::search_active_diamonds(&st.pool, &search).await {
 Ok(rows) => {
 if offset == 0 {
 if let Ok(value) = serde_json::to_value(&rows) {
 st.cache.put(&key_params, value);
 }
 }
 (StatusCode::OK,
 Json(DiamondSearchResponse { rows, cache_hit: false }))
 .into_response()
 }
 Err(e) => anyhow_error_response(e),
 }
}

// ---------------------------------------------------------------------------
// GET /v1/stream
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
 let mut headers = HeaderMap::new();
 headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
 headers.insert("Connection", HeaderValue::from_static("keep-alive"));

 let rx = st.bus.subscribe();
 let events = broadcast_to_sse(rx);

 (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(rx: broadcast::Receiver<BusMsg>) -> impl Stream<Item = Result<Event, Infallible>> {
 BroadcastStream::new(rx).filter_map(|msg| async move {
 match msg {
 Ok(m) => {
 let event_name = match &m {
 BusMsg::Heartbeat { .. } => "heartbeat",
 BusMsg::RunStarted { .. } => "run_started",
 BusMsg::RunCompleted { .. } => "run_completed",
 BusMsg::ConsolidationFinished { .. } => "consolidation_finished",
 BusMsg::PartitionsRetried { .. } => "partitions_retried",
 BusMsg::LogLine { .. } => "log",
 };
 let data = serde_json::to_string(&m).ok()?;
 Some(Ok(Event::default().event(event_name).data(data)))
 }
 Err(_) => None, // lagged / closed
 }
 })
}
