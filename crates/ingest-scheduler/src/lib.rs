//! ingest-scheduler
//!
//! Creates runs, computes the freshness window from the prior watermark,
//! invokes the heatmap partitioner, and enqueues one `work-items` message
//! per partition.

use chrono::{Duration, Utc};
use ingest_blob::WatermarkStore;
use ingest_db::{NewPartition, NewRun};
use ingest_feed::FeedAdapter;
use ingest_heatmap::HeatmapConfig;
use ingest_queue::{QueueMessage, WorkQueue};
use ingest_schemas::{IngestError, IngestResult, RunType, WorkItemMsg};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
 /// Subtracted from the prior watermark to tolerate clock skew and
 /// late-arriving updates at the vendor (default 15 min).
 pub safety_buffer: Duration,
 pub max_workers_full: usize,
 pub max_workers_incremental: usize,
 pub min_records_per_worker: i64,
 pub heatmap: HeatmapConfig,
}

impl Default for SchedulerConfig {
 fn default() -> Self {
 Self {
 safety_buffer: Duration::minutes(15),
 max_workers_full: 64,
 max_workers_incremental: 16,
 min_records_per_worker: 1,
 heatmap: HeatmapConfig::default(),
 }
 }
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
 /// `total_records` across all partitions was 0; the run was marked
 /// completed without enqueueing any work.
 CompletedImmediately { run_id: Uuid },
 Enqueued { run_id: Uuid, partition_count: usize },
}

pub async fn run_once(pool: &PgPool,
 watermark_store: &dyn WatermarkStore,
 adapter: Arc<dyn FeedAdapter>,
 queue: &dyn WorkQueue,
 config: &SchedulerConfig) -> IngestResult<RunOutcome> {
 let feed = adapter.feed_name();
 let now = Utc::now();

 let prior_watermark = watermark_store.read(feed).await?;
 let (run_type, updated_from, updated_to, max_workers) = match &prior_watermark {
 None => (RunType::Full, None, now, config.max_workers_full),
 Some(w) => (RunType::Incremental,
 Some(w.last_updated_at - config.safety_buffer),
 now,
 config.max_workers_incremental),
 };

 let base_query = adapter.build_base_query(updated_from, Some(updated_to));
 let raw_partitions = ingest_heatmap::scan(adapter.clone(), base_query, config.heatmap)
 .await
 .map_err(|e| IngestError::Transient(e.to_string()))?;
 let partitions = ingest_heatmap::finalize_partitions(raw_partitions, max_workers, config.min_records_per_worker);

 let run_id = Uuid::new_v4();
 let total_records: i64 = partitions.iter().map(|p| p.total_records).sum();

 ingest_db::insert_run(pool,
 &NewRun {
 run_id,
 feed: feed.to_string(),
 run_type,
 expected_workers: partitions.len() as i32,
 watermark_before: prior_watermark.as_ref().map(|w| w.last_updated_at),
 watermark_after: now,
 })
 .await
 .map_err(|e| IngestError::Fatal(e.to_string()))?;

 if partitions.is_empty() || total_records == 0 {
 ingest_db::complete_run_immediately(pool, run_id)
 .await
 .map_err(|e| IngestError::Fatal(e.to_string()))?;
 return Ok(RunOutcome::CompletedImmediately { run_id });
 }

 let new_partitions: Vec<NewPartition> = partitions
 .iter()
 .map(|p| NewPartition {
 partition_id: p.partition_id,
 min_price: p.min_price,
 max_price: p.max_price,
 total_records: p.total_records,
 work_item_payload: json!({
 "run_id": run_id,
 "partition_id": p.partition_id,
 "min_price": p.min_price,
 "max_price": p.max_price,
 "updated_from": updated_from,
 "updated_to": updated_to,
 }),
 })
 .collect();

 ingest_db::insert_partitions(pool, run_id, &new_partitions)
 .await
 .map_err(|e| IngestError::Fatal(e.to_string()))?;

 for p in &new_partitions {
 enqueue_work_item(queue, run_id, p.partition_id, 0, adapter.max_page_size(), &p.work_item_payload).await?;
 }

 Ok(RunOutcome::Enqueued {
 run_id,
 partition_count: new_partitions.len(),
 })
}

/// Shared by the Scheduler (first page) and the Monitor's retry path
/// (continuation from the persisted offset): deterministic `message_id`
/// so redelivery never creates a second live job for the same offset.
pub async fn enqueue_work_item(queue: &dyn WorkQueue,
 run_id: Uuid,
 partition_id: i32,
 offset: i64,
 limit: i64,
 work_item_payload: &serde_json::Value) -> IngestResult<()> {
 let message_id = WorkItemMsg::message_id_for(run_id, partition_id, offset);
 let msg = WorkItemMsg {
 message_id: message_id.clone(),
 run_id,
 partition_id,
 offset,
 limit,
 work_item_payload: work_item_payload.clone(),
 };
 queue
 .send(QueueMessage {
 message_id,
 body: serde_json::to_value(&msg).map_err(|e| IngestError::Fatal(e.to_string()))?,
 })
 .await
}
