//! ingest-worker
//!
//! Consumes `work-items` messages, fetches pages through the rate
//! limiter, writes raw rows, advances partition offset, and either
//! completes or continues the partition.

use chrono::Duration;
use ingest_db::RawRowUpsert;
use ingest_feed::{FeedAdapter, FeedQuery};
use ingest_queue::{Delivery, QueueMessage, WorkQueue};
use ingest_ratelimit::RateLimitConfig;
use ingest_schemas::{IngestError, IngestResult, WorkDoneMsg, WorkDoneOutcome, WorkItemMsg};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
 /// K: pages fetched on one leased message before handing off a fresh
 /// continuation message at the advanced offset (step 5).
 pub pages_per_continuation: u32,
 pub visibility_timeout: Duration,
 pub poll_wait: Duration,
 pub rate_limit_key: String,
 pub rate_limit: RateLimitConfig,
}

impl Default for WorkerConfig {
 fn default() -> Self {
 Self {
 pages_per_continuation: 10,
 visibility_timeout: Duration::seconds(60),
 poll_wait: Duration::seconds(5),
 rate_limit_key: "feed_global".to_string(),
 rate_limit: RateLimitConfig::default(),
 }
 }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
 /// Partition was already terminal when re-read; message discarded.
 AlreadyTerminal,
 /// Partition reached `total_records`; `WORK_DONE success` sent.
 Completed,
 /// K pages fetched; a continuation message was enqueued at the new offset.
 Continued { new_offset: i64 },
 /// A retryable adapter error abandoned the message for redelivery.
 Abandoned,
 /// A non-retryable adapter error failed the partition.
 Failed,
 /// Nothing was available to receive within `poll_wait`.
 Idle,
}

/// One iteration of the worker loop . Callers run this in a
/// `loop` until `Idle`, at which point the autoscaler decides whether to
/// re-spawn ("if none within poll-wait, exit").
pub async fn run_once(pool: &PgPool,
 adapter: Arc<dyn FeedAdapter>,
 work_items: &dyn WorkQueue,
 work_done: &dyn WorkQueue,
 config: &WorkerConfig) -> IngestResult<WorkOutcome> {
 let Some(delivery) = work_items.receive(config.visibility_timeout, config.poll_wait).await else {
 return Ok(WorkOutcome::Idle);
 };

 let msg: WorkItemMsg = serde_json::from_value(delivery.message.body.clone())
 .map_err(|e| IngestError::Validation(format!("malformed work item: {e}")))?;

 let partition = ingest_db::get_partition(pool, msg.run_id, msg.partition_id)
 .await
 .map_err(|e| IngestError::Fatal(e.to_string()))?
 .ok_or_else(|| IngestError::NotFound(format!("partition {}/{} not found", msg.run_id, msg.partition_id)))?;

 if partition.status.is_terminal() || partition.status == ingest_schemas::PartitionStatus::Stalled {
 work_items.complete(&delivery.receipt).await?;
 return Ok(WorkOutcome::AlreadyTerminal);
 }

 if partition.status == ingest_schemas::PartitionStatus::Pending {
 ingest_db::try_claim_partition(pool, msg.run_id, msg.partition_id)
 .await
 .map_err(|e| IngestError::Fatal(e.to_string()))?;
 }

 let query = query_from_payload(&msg.work_item_payload)?;
 let outcome = process_partition(pool, adapter, work_items, work_done, &delivery, &msg, &query, config).await?;
 Ok(outcome)
}

async fn process_partition(pool: &PgPool,
 adapter: Arc<dyn FeedAdapter>,
 work_items: &dyn WorkQueue,
 work_done: &dyn WorkQueue,
 delivery: &Delivery,
 msg: &WorkItemMsg,
 query: &FeedQuery,
 config: &WorkerConfig) -> IngestResult<WorkOutcome> {
 let mut offset = msg.offset;
 let limit = msg.limit.min(adapter.max_page_size());
 let feed = adapter.feed_name();

 for _page in 0..config.pages_per_continuation {
 if let Err(e) = ingest_ratelimit::acquire(pool, &config.rate_limit_key, &config.rate_limit).await {
 work_items.abandon(&delivery.receipt).await?;
 return Err(e);
 }

 let page = match adapter.search(query, offset, limit).await {
 Ok(page) => page,
 Err(e) if e.is_retryable => {
 work_items.abandon(&delivery.receipt).await?;
 return Ok(WorkOutcome::Abandoned);
 }
 Err(e) => {
 fail_partition(pool, msg, &e.to_string()).await?;
 send_work_done(work_done, msg.run_id, msg.partition_id, WorkDoneOutcome::Failed, Some(e.to_string()))
 .await?;
 work_items.complete(&delivery.receipt).await?;
 return Ok(WorkOutcome::Failed);
 }
 };

 if page.items.is_empty() || offset >= page.total_count {
 ingest_db::advance_offset(pool, msg.run_id, msg.partition_id, page.total_count)
 .await
 .map_err(|e| IngestError::Fatal(e.to_string()))?;
 ingest_db::mark_completed(pool, msg.run_id, msg.partition_id)
 .await
 .map_err(|e| IngestError::Fatal(e.to_string()))?;
 send_work_done(work_done, msg.run_id, msg.partition_id, WorkDoneOutcome::Success, None).await?;
 work_items.complete(&delivery.receipt).await?;
 return Ok(WorkOutcome::Completed);
 }

 for item in &page.items {
 let identity = adapter.extract_identity(item).map_err(IngestError::from)?;
 ingest_db::upsert_raw_row(pool,
 feed,
 &RawRowUpsert {
 supplier_stone_id: identity.supplier_stone_id,
 offer_id: identity.offer_id,
 payload: identity.payload,
 source_updated_at: identity.source_updated_at.unwrap_or_else(chrono::Utc::now),
 })
 .await
 .map_err(|e| IngestError::Transient(e.to_string()))?;
 }

 offset += page.items.len() as i64;
 ingest_db::advance_offset(pool, msg.run_id, msg.partition_id, offset)
 .await
 .map_err(|e| IngestError::Fatal(e.to_string()))?;
 }

 enqueue_continuation(work_items, msg, offset, limit).await?;
 work_items.complete(&delivery.receipt).await?;
 Ok(WorkOutcome::Continued { new_offset: offset })
}

async fn fail_partition(pool: &PgPool, msg: &WorkItemMsg, error_message: &str) -> IngestResult<()> {
 let next_retry_at = chrono::Utc::now() + chrono::Duration::minutes(1);
 ingest_db::mark_failed(pool, msg.run_id, msg.partition_id, error_message, next_retry_at)
 .await
 .map_err(|e| IngestError::Fatal(e.to_string()))?;
 Ok(())
}

async fn send_work_done(work_done: &dyn WorkQueue,
 run_id: uuid::Uuid,
 partition_id: i32,
 outcome: WorkDoneOutcome,
 error_message: Option<String>) -> IngestResult<()> {
 let msg = WorkDoneMsg {
 run_id,
 partition_id,
 outcome,
 error_message,
 };
 work_done
 .send(QueueMessage {
 message_id: format!("work-done:{run_id}:{partition_id}"),
 body: serde_json::to_value(&msg).map_err(|e| IngestError::Fatal(e.to_string()))?,
 })
 .await
}

async fn enqueue_continuation(work_items: &dyn WorkQueue,
 msg: &WorkItemMsg,
 new_offset: i64,
 limit: i64) -> IngestResult<()> {
 let message_id = WorkItemMsg::message_id_for(msg.run_id, msg.partition_id, new_offset);
 let continuation = WorkItemMsg {
 message_id: message_id.clone(),
 run_id: msg.run_id,
 partition_id: msg.partition_id,
 offset: new_offset,
 limit,
 work_item_payload: msg.work_item_payload.clone(),
 };
 work_items
 .send(QueueMessage {
 message_id,
 body: serde_json::to_value(&continuation).map_err(|e| IngestError::Fatal(e.to_string()))?,
 })
 .await
}

fn query_from_payload(payload: &serde_json::Value) -> IngestResult<FeedQuery> {
 let min_price_minor = payload
 .get("min_price")
 .and_then(|v| v.as_i64())
 .ok_or_else(|| IngestError::Validation("work item payload missing min_price".to_string()))?;
 let max_price_minor = payload
 .get("max_price")
 .and_then(|v| v.as_i64())
 .ok_or_else(|| IngestError::Validation("work item payload missing max_price".to_string()))?;
 let updated_from = payload
 .get("updated_from")
 .and_then(|v| v.as_str())
 .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
 .map(|dt| dt.with_timezone(&chrono::Utc));
 let updated_to = payload
 .get("updated_to")
 .and_then(|v| v.as_str())
 .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
 .map(|dt| dt.with_timezone(&chrono::Utc));

 Ok(FeedQuery {
 min_price_minor,
 max_price_minor,
 updated_from,
 updated_to,
 })
}
