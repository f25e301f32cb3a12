//! Shared runtime state for ingest-daemon.
//!
//! All types here are `Clone`-able (via `Arc`). Handlers receive
//! `State<Arc<AppState>>` from Axum; this module owns nothing async itself.

use std::sync::Arc;
use std::time::Duration;

use ingest_blob::{FsWatermarkStore, WatermarkStore};
use ingest_cache::{CacheConfig, ResponseCache};
use ingest_feed::{DemoFeedAdapter, FeedAdapter, FeedRegistry};
use ingest_queue::{InMemoryWorkQueue, WorkQueue};
use ingest_scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Messages broadcast over the internal event bus and surfaced as SSE events
/// (`/v1/stream`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
 Heartbeat { ts_millis: i64 },
 RunStarted { run_id: Uuid, feed: String },
 RunCompleted { run_id: Uuid, partitions: usize },
 ConsolidationFinished { run_id: Uuid, rows: i64, soft_deleted: u64 },
 PartitionsRetried { feed: String, count: usize },
 LogLine { level: String, msg: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
 pub service: &'static str,
 pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
 pub bus: broadcast::Sender<BusMsg>,
 pub build: BuildInfo,
 pub pool: PgPool,
 pub watermark_store: Arc<dyn WatermarkStore>,
 pub feeds: Arc<FeedRegistry>,
 pub work_items: Arc<dyn WorkQueue>,
 pub work_done: Arc<dyn WorkQueue>,
 pub cache: Arc<ResponseCache>,
 pub scheduler_config: SchedulerConfig,
}

impl AppState {
 pub fn new(pool: PgPool, watermark_dir: impl Into<std::path::PathBuf>) -> Self {
 let (bus, _rx) = broadcast::channel::<BusMsg>(1024);

 let mut feeds = FeedRegistry::new();
 let demo: Arc<dyn FeedAdapter> = Arc::new(DemoFeedAdapter::default());
 feeds.register(demo);

 Self {
 bus,
 build: BuildInfo {
 service: "ingest-daemon",
 version: env!("CARGO_PKG_VERSION"),
 },
 pool,
 watermark_store: Arc::new(FsWatermarkStore::new(watermark_dir)),
 feeds: Arc::new(feeds),
 work_items: Arc::new(InMemoryWorkQueue::new()),
 work_done: Arc::new(InMemoryWorkQueue::new()),
 cache: Arc::new(ResponseCache::new(&CacheConfig::default())),
 scheduler_config: SchedulerConfig::default(),
 }
 }
}

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
 static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
 START.get_or_init(std::time::Instant::now).elapsed().as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
/// Lifecycle-detached: never blocks request handling or shutdown.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
 tokio::spawn(async move {
 let mut ticker = tokio::time::interval(interval);
 loop {
 ticker.tick().await;
 let ts = chrono::Utc::now().timestamp_millis();
 let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
 }
 });
}

/// Spawn the dataset-version polling task that keeps the Response Cache's
/// composite version fresh.
pub fn spawn_cache_poller(pool: PgPool, cache: Arc<ResponseCache>, interval: Duration) {
 tokio::spawn(ingest_cache::run_version_poller(pool, cache, interval));
}
