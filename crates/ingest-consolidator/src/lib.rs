//! ingest-consolidator
//!
//! Drains pending `raw_{feed}` rows into the canonical `diamonds` table.
//! Runs `CONSOLIDATOR_CONCURRENCY` claim loops in parallel, each batch
//! mapped and upserted in one transaction; a row left `claimed` by a
//! crashed worker is reclaimed once its lease expires (the Monitor's
//! `sweep_expired_claims` tick, not a responsibility of this crate). Once
//! no pending rows remain, the version bump and watermark write happen for
//! every successful run (soft-delete of feed-absent diamonds is restricted
//! to `Full` runs, which are the only ones that saw the feed's complete
//! listing) — version bump and soft-delete share one transaction so
//! readers never observe one without the other.

use ingest_blob::WatermarkStore;
use ingest_db::DiamondUpsert;
use ingest_feed::FeedAdapter;
use ingest_schemas::{ConsolidateMsg, IngestError, IngestResult, RunType, Watermark};
use sqlx::PgPool;
use std::sync::{
 atomic::{AtomicI64, Ordering},
 Arc,
};

#[derive(Debug, Clone)]
pub struct ConsolidatorConfig {
 pub batch_size: i64,
 pub claim_lease: chrono::Duration,
 pub concurrency: usize,
}

impl Default for ConsolidatorConfig {
 fn default() -> Self {
 Self {
 batch_size: 200,
 claim_lease: chrono::Duration::minutes(5),
 concurrency: 4,
 }
 }
}

#[derive(Debug, Clone, Default)]
pub struct ConsolidationReport {
 pub rows_consolidated: i64,
 pub soft_deleted: u64,
 pub new_version: Option<i64>,
}

/// One full consolidation pass for `msg.feed`, triggered by the Scheduler
/// (end of a run) or the Monitor (periodic retry). Drains every pending
/// raw row, bumps the dataset version and advances the watermark, and —
/// only for a `Full` run — soft-deletes diamonds the feed no longer lists.
pub async fn consolidate(pool: &PgPool,
 adapter: Arc<dyn FeedAdapter>,
 watermark_store: &dyn WatermarkStore,
 msg: &ConsolidateMsg,
 config: &ConsolidatorConfig) -> IngestResult<ConsolidationReport> {
 let rows_consolidated = Arc::new(AtomicI64::new(0));
 let mut workers = tokio::task::JoinSet::new();

 for _ in 0..config.concurrency {
 let pool = pool.clone();
 let adapter = Arc::clone(&adapter);
 let feed = msg.feed.clone();
 let batch_size = config.batch_size;
 let lease = config.claim_lease;
 let counter = Arc::clone(&rows_consolidated);

 workers.spawn(async move {
 loop {
 let claimed = ingest_db::claim_batch(&pool, &feed, batch_size, lease)
 .await
 .map_err(|e| IngestError::Transient(e.to_string()))?;
 if claimed.is_empty() {
 return Ok::<(), IngestError>(());
 }

 let mut tx = pool.begin().await.map_err(|e| IngestError::Transient(e.to_string()))?;
 let mut done_ids = Vec::with_capacity(claimed.len());
 for row in &claimed {
 let fields = adapter
 .map_raw_to_canonical(&row.payload)
 .map_err(IngestError::from)?;
 ingest_db::upsert_diamond(&mut tx,
 &DiamondUpsert {
 feed: feed.clone(),
 supplier_stone_id: row.supplier_stone_id.clone(),
 offer_id: row.offer_id.clone(),
 shape: fields.shape,
 carat: fields.carat,
 color: fields.color,
 clarity: fields.clarity,
 cut: fields.cut,
 price_minor: fields.price_minor,
 availability: fields.availability,
 source_updated_at: row.source_updated_at.unwrap_or_else(chrono::Utc::now),
 })
 .await
 .map_err(|e| IngestError::Transient(e.to_string()))?;
 done_ids.push(row.supplier_stone_id.clone());
 }
 tx.commit().await.map_err(|e| IngestError::Transient(e.to_string()))?;

 ingest_db::mark_done(&pool, &feed, &done_ids)
 .await
 .map_err(|e| IngestError::Transient(e.to_string()))?;
 counter.fetch_add(done_ids.len() as i64, Ordering::Relaxed);
 }
 });
 }

 while let Some(result) = workers.join_next().await {
 result.map_err(|e| IngestError::Fatal(format!("consolidator worker panicked: {e}")))??;
 }

 let run = ingest_db::get_run(pool, msg.run_id)
 .await
 .map_err(|e| IngestError::Fatal(e.to_string()))?
 .ok_or_else(|| IngestError::NotFound(format!("run {} not found", msg.run_id)))?;

 let mut report = ConsolidationReport {
 rows_consolidated: rows_consolidated.load(Ordering::Relaxed),
 ..Default::default()
 };

 // Soft-delete of feed-absent diamonds only makes sense for a Full run,
 // which saw every stone the feed currently lists. Version bump and
 // watermark advance happen for every successful run — an Incremental
 // run that skips this would pin `watermark.last_updated_at` forever and
 // the scheduler would re-scan the same window on every subsequent run.
 let mut tx = pool.begin().await.map_err(|e| IngestError::Transient(e.to_string()))?;

 if run.run_type == RunType::Full {
 let still_present = ingest_db::all_known_stone_ids(pool, &msg.feed)
 .await
 .map_err(|e| IngestError::Transient(e.to_string()))?;
 report.soft_deleted = ingest_db::soft_delete_absent(&mut tx, &msg.feed, &still_present)
 .await
 .map_err(|e| IngestError::Transient(e.to_string()))?;
 }

 let version = ingest_db::bump_version(&mut tx, &msg.feed)
 .await
 .map_err(|e| IngestError::Transient(e.to_string()))?;
 tx.commit().await.map_err(|e| IngestError::Transient(e.to_string()))?;
 report.new_version = Some(version);

 watermark_store
 .write(&msg.feed,
 &Watermark {
 last_updated_at: run.watermark_after,
 last_run_id: Some(run.run_id),
 last_run_completed_at: Some(chrono::Utc::now()),
 })
 .await?;

 Ok(report)
}
