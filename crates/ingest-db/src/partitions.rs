//! `partition_progress` access ("Partition" Worker Monitor).
//!
//! Status transitions are all CAS (compare-and-swap): the WHERE clause pins
//! the expected prior status so two replicas racing on the same partition
//! can't both believe they made the transition.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ingest_schemas::{Partition, PartitionStatus};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewPartition {
 pub partition_id: i32,
 pub min_price: i64,
 pub max_price: i64,
 pub total_records: i64,
 pub work_item_payload: Value,
}

pub async fn insert_partitions(pool: &PgPool, run_id: Uuid, partitions: &[NewPartition]) -> Result<()> {
 let mut tx = pool.begin().await.context("insert_partitions begin failed")?;
 for p in partitions {
 sqlx::query(r#"
 insert into partition_progress (run_id, partition_id, min_price, max_price, total_records, work_item_payload) values ($1, $2, $3, $4, $5, $6)
 "#)
 .bind(run_id)
 .bind(p.partition_id)
 .bind(p.min_price)
 .bind(p.max_price)
 .bind(p.total_records)
 .bind(&p.work_item_payload)
 .execute(&mut *tx)
 .await
 .context("insert_partitions row failed")?;
 }
 tx.commit().await.context("insert_partitions commit failed")?;
 Ok(())
}

pub async fn get_partition(pool: &PgPool, run_id: Uuid, partition_id: i32) -> Result<Option<Partition>> {
 let row = sqlx::query_as::<_, Partition>("select * from partition_progress where run_id = $1 and partition_id = $2")
 .bind(run_id)
 .bind(partition_id)
 .fetch_optional(pool)
 .await
 .context("get_partition failed")?;
 Ok(row)
}

pub async fn list_partitions(pool: &PgPool, run_id: Uuid) -> Result<Vec<Partition>> {
 let rows = sqlx::query_as::<_, Partition>("select * from partition_progress where run_id = $1 order by partition_id")
 .bind(run_id)
 .fetch_all(pool)
 .await
 .context("list_partitions failed")?;
 Ok(rows)
}

/// CAS: pending -> running. Returns false if another worker already claimed it.
pub async fn try_claim_partition(pool: &PgPool, run_id: Uuid, partition_id: i32) -> Result<bool> {
 let result = sqlx::query(r#"
 update partition_progress
 set status = 'running', last_heartbeat = now
 where run_id = $1 and partition_id = $2 and status = 'pending'
 "#)
 .bind(run_id)
 .bind(partition_id)
 .execute(pool)
 .await
 .context("try_claim_partition failed")?;
 Ok(result.rows_affected() == 1)
}

/// Advance `next_offset` and refresh the heartbeat after a successful page
/// fetch. Does not change status.
pub async fn advance_offset(pool: &PgPool, run_id: Uuid, partition_id: i32, new_offset: i64) -> Result<()> {
 sqlx::query(r#"
 update partition_progress
 set next_offset = $3, last_heartbeat = now
 where run_id = $1 and partition_id = $2
 "#)
 .bind(run_id)
 .bind(partition_id)
 .bind(new_offset)
 .execute(pool)
 .await
 .context("advance_offset failed")?;
 Ok(())
}

pub async fn heartbeat(pool: &PgPool, run_id: Uuid, partition_id: i32) -> Result<()> {
 sqlx::query(r#"
 update partition_progress
 set last_heartbeat = now
 where run_id = $1 and partition_id = $2
 "#)
 .bind(run_id)
 .bind(partition_id)
 .execute(pool)
 .await
 .context("heartbeat failed")?;
 Ok(())
}

/// CAS: running -> completed.
pub async fn mark_completed(pool: &PgPool, run_id: Uuid, partition_id: i32) -> Result<bool> {
 let result = sqlx::query(r#"
 update partition_progress
 set status = 'completed', last_heartbeat = now
 where run_id = $1 and partition_id = $2 and status = 'running'
 "#)
 .bind(run_id)
 .bind(partition_id)
 .execute(pool)
 .await
 .context("mark_completed failed")?;
 Ok(result.rows_affected() == 1)
}

/// CAS: running -> failed, recording the error and scheduling a retry
/// backoff window (exponential backoff capped at a ceiling).
pub async fn mark_failed(pool: &PgPool,
 run_id: Uuid,
 partition_id: i32,
 error_message: &str,
 next_retry_at: DateTime<Utc>) -> Result<bool> {
 let result = sqlx::query(r#"
 update partition_progress
 set status = 'failed',
 retry_count = retry_count + 1,
 next_retry_at = $3,
 error_message = $4,
 last_heartbeat = now
 where run_id = $1 and partition_id = $2 and status = 'running'
 "#)
 .bind(run_id)
 .bind(partition_id)
 .bind(next_retry_at)
 .bind(error_message)
 .execute(pool)
 .await
 .context("mark_failed failed")?;
 Ok(result.rows_affected() == 1)
}

/// CAS: running -> stalled. Used by the Monitor when a heartbeat has not
/// been refreshed within the stall threshold.
pub async fn mark_stalled(pool: &PgPool, run_id: Uuid, partition_id: i32) -> Result<bool> {
 let result = sqlx::query(r#"
 update partition_progress
 set status = 'stalled'
 where run_id = $1 and partition_id = $2 and status = 'running'
 "#)
 .bind(run_id)
 .bind(partition_id)
 .execute(pool)
 .await
 .context("mark_stalled failed")?;
 Ok(result.rows_affected() == 1)
}

/// CAS: failed|stalled -> pending, clearing the error so a retry attempt can
/// claim it fresh. Only rows past their `next_retry_at` are eligible.
pub async fn requeue_for_retry(pool: &PgPool, run_id: Uuid, partition_id: i32) -> Result<bool> {
 let result = sqlx::query(r#"
 update partition_progress
 set status = 'pending', error_message = null
 where run_id = $1 and partition_id = $2
 and status in ('failed', 'stalled')
 and (next_retry_at is null or next_retry_at <= now)
 "#)
 .bind(run_id)
 .bind(partition_id)
 .execute(pool)
 .await
 .context("requeue_for_retry failed")?;
 Ok(result.rows_affected() == 1)
}

/// Partitions that have gone stale: `running` but the heartbeat is older
/// than `stall_after`. Feeds the Monitor's stall-detection tick.
pub async fn find_stale_running(pool: &PgPool, run_id: Uuid, stall_after: chrono::Duration) -> Result<Vec<Partition>> {
 let threshold = Utc::now() - stall_after;
 let rows = sqlx::query_as::<_, Partition>(r#"
 select * from partition_progress
 where run_id = $1 and status = 'running' and last_heartbeat < $2
 order by partition_id
 "#)
 .bind(run_id)
 .bind(threshold)
 .fetch_all(pool)
 .await
 .context("find_stale_running failed")?;
 Ok(rows)
}

pub async fn all_terminal(pool: &PgPool, run_id: Uuid) -> Result<bool> {
 let (n): (i64) = sqlx::query_as(r#"
 select count(*)::bigint
 from partition_progress
 where run_id = $1 and status not in ('completed', 'failed')
 "#)
 .bind(run_id)
 .fetch_one(pool)
 .await
 .context("all_terminal failed")?;
 Ok(n == 0)
}

pub fn is_terminal(status: PartitionStatus) -> bool {
 matches!(status, PartitionStatus::Completed | PartitionStatus::Failed)
}

/// Stale `running` partitions across every run of `feed`, joined through
/// `run_metadata` since `partition_progress` has no `feed` column of its
/// own. Feeds the Monitor's per-feed stall-detection tick.
pub async fn find_stale_running_by_feed(pool: &PgPool, feed: &str, stall_after: chrono::Duration) -> Result<Vec<Partition>> {
 let threshold = Utc::now() - stall_after;
 let rows = sqlx::query_as::<_, Partition>(r#"
 select pp.* from partition_progress pp
 join run_metadata r on r.run_id = pp.run_id
 where r.feed = $1 and pp.status = 'running' and pp.last_heartbeat < $2
 order by pp.run_id, pp.partition_id
 "#)
 .bind(feed)
 .bind(threshold)
 .fetch_all(pool)
 .await
 .context("find_stale_running_by_feed failed")?;
 Ok(rows)
}

/// Partitions of `feed` that are `failed`/`stalled` and past their retry
/// backoff window, across every run. Feeds the Monitor's retry tick.
pub async fn list_retryable_by_feed(pool: &PgPool, feed: &str) -> Result<Vec<Partition>> {
 let rows = sqlx::query_as::<_, Partition>(r#"
 select pp.* from partition_progress pp
 join run_metadata r on r.run_id = pp.run_id
 where r.feed = $1
 and pp.status in ('failed', 'stalled')
 and (pp.next_retry_at is null or pp.next_retry_at <= now)
 order by pp.run_id, pp.partition_id
 "#)
 .bind(feed)
 .fetch_all(pool)
 .await
 .context("list_retryable_by_feed failed")?;
 Ok(rows)
}
