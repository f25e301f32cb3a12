//! ingest-monitor
//!
//! Periodic sweep over one feed's in-flight runs : detects
//! stalled partitions via heartbeat age, requeues failed/stalled
//! partitions past their retry backoff, and reclaims raw rows whose
//! consolidation claim lease expired without a `mark_done`. A crashed
//! worker or consolidator is recovered entirely through CAS transitions
//! already owned by `ingest-db` — this crate only decides *when* to apply
//! them and re-publishes the queue message a retried partition needs.

use async_trait::async_trait;
use ingest_queue::{QueueMessage, WorkQueue};
use ingest_schemas::{ConsolidateMsg, IngestError, IngestResult, WorkItemMsg};
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
 /// A `running` partition whose heartbeat is older than this is stalled.
 pub stall_after: chrono::Duration,
 /// Page size used for the re-enqueued work item; the worker clamps
 /// this to the adapter's own `max_page_size` on receipt.
 pub retry_page_limit: i32,
}

impl Default for MonitorConfig {
 fn default() -> Self {
 Self {
 stall_after: chrono::Duration::minutes(2),
 retry_page_limit: 50,
 }
 }
}

#[derive(Debug, Clone, Default)]
pub struct MonitorReport {
 pub stalled: usize,
 pub retried: usize,
 pub claims_swept: u64,
}

/// Dispatcher port the Monitor calls to kick a Consolidator pass, resolving
/// the Monitor/Consolidator import cycle without either crate depending on
/// the other directly (DESIGN NOTES).
#[async_trait]
pub trait ConsolidateTrigger: Send + Sync {
 async fn trigger(&self, msg: ConsolidateMsg) -> IngestResult<()>;
}

/// Publishes a `ConsolidateMsg` onto a `WorkQueue`; the reference
/// implementation of [`ConsolidateTrigger`] used when the Consolidator is
/// itself driven by a queue consumer rather than called in-process.
pub struct QueueConsolidateTrigger<'a> {
 pub queue: &'a dyn WorkQueue,
}

#[async_trait]
impl<'a> ConsolidateTrigger for QueueConsolidateTrigger<'a> {
 async fn trigger(&self, msg: ConsolidateMsg) -> IngestResult<()> {
 let message_id = format!("consolidate:{}", msg.run_id);
 self.queue
 .send(QueueMessage {
 message_id,
 body: serde_json::to_value(&msg).map_err(|e| IngestError::Fatal(e.to_string()))?,
 })
 .await
 }
}

/// One monitor tick for `feed`. Re-enqueues every partition it retries so
/// an idle worker fleet picks the work back up without a separate poll.
pub async fn run_once(pool: &PgPool,
 feed: &str,
 work_items: &dyn WorkQueue,
 config: &MonitorConfig) -> IngestResult<MonitorReport> {
 let mut report = MonitorReport::default();

 let stale = ingest_db::find_stale_running_by_feed(pool, feed, config.stall_after)
 .await
 .map_err(|e| IngestError::Transient(e.to_string()))?;
 for partition in &stale {
 if ingest_db::mark_stalled(pool, partition.run_id, partition.partition_id)
 .await
 .map_err(|e| IngestError::Transient(e.to_string()))?
 {
 report.stalled += 1;
 tracing::warn!(run_id = %partition.run_id, partition_id = partition.partition_id, "partition stalled");
 }
 }

 let retryable = ingest_db::list_retryable_by_feed(pool, feed)
 .await
 .map_err(|e| IngestError::Transient(e.to_string()))?;
 for partition in &retryable {
 let requeued = ingest_db::requeue_for_retry(pool, partition.run_id, partition.partition_id)
 .await
 .map_err(|e| IngestError::Transient(e.to_string()))?;
 if !requeued {
 continue;
 }
 let message_id = WorkItemMsg::message_id_for(partition.run_id, partition.partition_id, partition.next_offset);
 let msg = WorkItemMsg {
 message_id: message_id.clone(),
 run_id: partition.run_id,
 partition_id: partition.partition_id,
 offset: partition.next_offset,
 limit: config.retry_page_limit,
 work_item_payload: partition.work_item_payload.clone(),
 };
 work_items
 .send(QueueMessage {
 message_id,
 body: serde_json::to_value(&msg).map_err(|e| IngestError::Fatal(e.to_string()))?,
 })
 .await?;
 report.retried += 1;
 tracing::info!(run_id = %partition.run_id, partition_id = partition.partition_id, "partition retried");
 }

 report.claims_swept = ingest_db::sweep_expired_claims(pool, feed)
 .await
 .map_err(|e| IngestError::Transient(e.to_string()))?;

 Ok(report)
}
