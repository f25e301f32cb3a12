//! `run_metadata` access ("Run" Scheduler).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ingest_schemas::{Run, RunType};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewRun {
 pub run_id: Uuid,
 pub feed: String,
 pub run_type: RunType,
 pub expected_workers: i32,
 pub watermark_before: Option<DateTime<Utc>>,
 pub watermark_after: DateTime<Utc>,
}

pub async fn insert_run(pool: &PgPool, run: &NewRun) -> Result<()> {
 sqlx::query(r#"
 insert into run_metadata (run_id, feed, run_type, expected_workers, watermark_before, watermark_after) values ($1, $2, $3, $4, $5, $6)
 "#)
 .bind(run.run_id)
 .bind(&run.feed)
 .bind(run.run_type)
 .bind(run.expected_workers)
 .bind(run.watermark_before)
 .bind(run.watermark_after)
 .execute(pool)
 .await
 .context("insert_run failed")?;
 Ok(())
}

pub async fn get_run(pool: &PgPool, run_id: Uuid) -> Result<Option<Run>> {
 let run = sqlx::query_as::<_, Run>("select * from run_metadata where run_id = $1")
 .bind(run_id)
 .fetch_optional(pool)
 .await
 .context("get_run failed")?;
 Ok(run)
}

/// Mark the run completed immediately (total-records = 0).
pub async fn complete_run_immediately(pool: &PgPool, run_id: Uuid) -> Result<()> {
 sqlx::query(r#"
 update run_metadata
 set completed_at = now
 where run_id = $1 and completed_at is null
 "#)
 .bind(run_id)
 .execute(pool)
 .await
 .context("complete_run_immediately failed")?;
 Ok(())
}

/// Operator-triggered cancel (`POST /v1/runs/{run_id}/cancel`):
/// every partition still in a non-terminal state is force-failed with a
/// `cancelled` error and a `next_retry_at` set past the retry horizon, so
/// the Monitor's retry sweep never resurrects it, and the run is stamped
/// completed. Returns the number of partitions cancelled.
pub async fn cancel_run(pool: &PgPool, run_id: Uuid) -> Result<u64> {
 let result = sqlx::query(r#"
 update partition_progress
 set status = 'failed', error_message = 'cancelled', next_retry_at = $2
 where run_id = $1 and status not in ('completed', 'failed')
 "#)
 .bind(run_id)
 .bind(DateTime::<Utc>::MAX_UTC)
 .execute(pool)
 .await
 .context("cancel_run partition update failed")?;

 complete_run_immediately(pool, run_id).await?;
 Ok(result.rows_affected())
}

/// Increment the completed-or-failed worker counter and, if the run has now
/// reached `expected_workers`, stamp `completed_at`. Atomic: one UPDATE, no
/// read-modify-write race between concurrent worker completions.
pub async fn record_worker_outcome(pool: &PgPool, run_id: Uuid, succeeded: bool) -> Result<()> {
 let column = if succeeded {
 "completed_workers"
 } else {
 "failed_workers"
 };

 let sql = format!(r#"
 update run_metadata
 set {column} = {column} + 1,
 completed_at = case
 when {column} + 1 + (case when '{column}' = 'completed_workers'
 then failed_workers else completed_workers end)
 >= expected_workers
 then now
 else completed_at
 end
 where run_id = $1
 "#);

 sqlx::query(&sql)
 .bind(run_id)
 .execute(pool)
 .await
 .context("record_worker_outcome failed")?;
 Ok(())
}

/// `LIVE`-run-style guardrail analogue: count runs of a feed that have not
/// yet terminated (used by the CLI/daemon to warn before a destructive
/// admin reset).
pub async fn count_active_runs(pool: &PgPool, feed: &str) -> Result<i64> {
 let (n): (i64) = sqlx::query_as(r#"
 select count(*)::bigint
 from run_metadata
 where feed = $1 and completed_at is null
 "#)
 .bind(feed)
 .fetch_one(pool)
 .await
 .context("count_active_runs failed")?;
 Ok(n)
}
