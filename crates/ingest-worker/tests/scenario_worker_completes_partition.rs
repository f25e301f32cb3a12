use ingest_feed::DemoFeedAdapter;
use ingest_queue::{InMemoryWorkQueue, QueueMessage, WorkQueue};
use ingest_schemas::{RunType, WorkItemMsg};
use ingest_worker::{run_once, WorkOutcome, WorkerConfig};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

macro_rules! skip_if_no_db {
 () => {
 match std::env::var(ingest_db::ENV_DB_URL) {
 Ok(v) => v,
 Err(_) => {
 eprintln!("SKIP: INGEST_DATABASE_URL not set");
 return Ok(());
 }
 }
 };
}

#[tokio::test]
async fn worker_pages_through_partition_then_completes() -> anyhow::Result<()> {
 let url = skip_if_no_db!();
 let pool = ingest_db::connect(&url).await?;
 ingest_db::migrate(&pool).await?;

 let adapter: Arc<dyn ingest_feed::FeedAdapter> = Arc::new(DemoFeedAdapter::new(42, 37));
 let base_query = adapter.build_base_query(None, None);
 let total = adapter.count(&base_query).await?;

 let run_id = Uuid::new_v4();
 ingest_db::insert_run(&pool,
 &ingest_db::NewRun {
 run_id,
 feed: "demo".to_string(),
 run_type: RunType::Full,
 expected_workers: 1,
 watermark_before: None,
 watermark_after: chrono::Utc::now(),
 })
 .await?;

 let payload = json!({
 "min_price": base_query.min_price_minor,
 "max_price": base_query.max_price_minor,
 });

 ingest_db::insert_partitions(&pool,
 run_id,
 &[ingest_db::NewPartition {
 partition_id: 0,
 min_price: base_query.min_price_minor,
 max_price: base_query.max_price_minor,
 total_records: total,
 work_item_payload: payload.clone(),
 }])
 .await?;

 let work_items = InMemoryWorkQueue::new();
 let work_done = InMemoryWorkQueue::new();
 work_items
 .send(QueueMessage {
 message_id: WorkItemMsg::message_id_for(run_id, 0, 0),
 body: serde_json::to_value(&WorkItemMsg {
 message_id: WorkItemMsg::message_id_for(run_id, 0, 0),
 run_id,
 partition_id: 0,
 offset: 0,
 limit: 30,
 work_item_payload: payload,
 })?,
 })
 .await?;

 let config = WorkerConfig {
 pages_per_continuation: 10,
 ..WorkerConfig::default()
 };

 let outcome = run_once(&pool, adapter, &work_items, &work_done, &config).await?;
 assert_eq!(outcome, WorkOutcome::Completed);

 let partition = ingest_db::get_partition(&pool, run_id, 0).await?.unwrap();
 assert_eq!(partition.next_offset, 37);
 assert_eq!(partition.status, ingest_schemas::PartitionStatus::Completed);
 assert_eq!(work_done.pending_count().await, 1);

 Ok(())
}

#[tokio::test]
async fn worker_discards_message_for_already_terminal_partition() -> anyhow::Result<()> {
 let url = skip_if_no_db!();
 let pool = ingest_db::connect(&url).await?;
 ingest_db::migrate(&pool).await?;

 let adapter: Arc<dyn ingest_feed::FeedAdapter> = Arc::new(DemoFeedAdapter::new(1, 10));
 let run_id = Uuid::new_v4();
 ingest_db::insert_run(&pool,
 &ingest_db::NewRun {
 run_id,
 feed: "demo".to_string(),
 run_type: RunType::Full,
 expected_workers: 1,
 watermark_before: None,
 watermark_after: chrono::Utc::now(),
 })
 .await?;

 ingest_db::insert_partitions(&pool,
 run_id,
 &[ingest_db::NewPartition {
 partition_id: 0,
 min_price: 0,
 max_price: 100,
 total_records: 5,
 work_item_payload: json!({"min_price": 0, "max_price": 100}),
 }])
 .await?;
 ingest_db::try_claim_partition(&pool, run_id, 0).await?;
 ingest_db::mark_completed(&pool, run_id, 0).await?;

 let work_items = InMemoryWorkQueue::new();
 let work_done = InMemoryWorkQueue::new();
 work_items
 .send(QueueMessage {
 message_id: WorkItemMsg::message_id_for(run_id, 0, 0),
 body: serde_json::to_value(&WorkItemMsg {
 message_id: WorkItemMsg::message_id_for(run_id, 0, 0),
 run_id,
 partition_id: 0,
 offset: 0,
 limit: 30,
 work_item_payload: json!({"min_price": 0, "max_price": 100}),
 })?,
 })
 .await?;

 let outcome = run_once(&pool, adapter, &work_items, &work_done, &WorkerConfig::default()).await?;
 assert_eq!(outcome, WorkOutcome::AlreadyTerminal);
 Ok(())
}
