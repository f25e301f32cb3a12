//! `rate_limit` fixed-window token bucket (Rate Limiter).
//!
//! The window is advisory-locked per key via `SELECT ... FOR UPDATE`, so
//! concurrent workers contending on the same feed's rate limit serialize on
//! this one row instead of racing a read-then-write.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
 pub allowed: bool,
 pub window_start: DateTime<Utc>,
 pub request_count: i32,
}

/// Attempt to record one request against `key` within a fixed window of
/// `window_len`. If the current window has expired, it rolls over and the
/// count resets to 1. Returns `allowed = false` without mutating state when
/// the window is already at `max_requests`.
pub async fn try_acquire(pool: &PgPool,
 key: &str,
 max_requests: i32,
 window_len: chrono::Duration) -> Result<RateLimitDecision> {
 let mut tx = pool.begin().await.context("try_acquire begin failed")?;
 let now = Utc::now();

 let existing = sqlx::query_as::<_, (DateTime<Utc>, i32)>(r#"
 select window_start, request_count
 from rate_limit
 where key = $1
 for update
 "#)
 .bind(key)
 .fetch_optional(&mut *tx)
 .await
 .context("try_acquire select failed")?;

 let decision = match existing {
 None => {
 insert_window(&mut tx, key, now).await?;
 RateLimitDecision {
 allowed: true,
 window_start: now,
 request_count: 1,
 }
 }
 Some((window_start, _count)) if now - window_start >= window_len => {
 reset_window(&mut tx, key, now).await?;
 RateLimitDecision {
 allowed: true,
 window_start: now,
 request_count: 1,
 }
 }
 Some((window_start, count)) if count < max_requests => {
 increment_window(&mut tx, key, now).await?;
 RateLimitDecision {
 allowed: true,
 window_start,
 request_count: count + 1,
 }
 }
 Some((window_start, count)) => RateLimitDecision {
 allowed: false,
 window_start,
 request_count: count,
 },
 };

 tx.commit().await.context("try_acquire commit failed")?;
 Ok(decision)
}

async fn insert_window(tx: &mut Transaction<'_, Postgres>, key: &str, now: DateTime<Utc>) -> Result<()> {
 sqlx::query(r#"
 insert into rate_limit (key, window_start, request_count, last_request_at)
 values ($1, $2, 1, $2)
 on conflict (key) do update set
 window_start = excluded.window_start,
 request_count = 1,
 last_request_at = excluded.last_request_at
 "#)
 .bind(key)
 .bind(now)
 .execute(&mut **tx)
 .await
 .context("insert_window failed")?;
 Ok(())
}

async fn reset_window(tx: &mut Transaction<'_, Postgres>, key: &str, now: DateTime<Utc>) -> Result<()> {
 sqlx::query(r#"
 update rate_limit
 set window_start = $2, request_count = 1, last_request_at = $2
 where key = $1
 "#)
 .bind(key)
 .bind(now)
 .execute(&mut **tx)
 .await
 .context("reset_window failed")?;
 Ok(())
}

async fn increment_window(tx: &mut Transaction<'_, Postgres>, key: &str, now: DateTime<Utc>) -> Result<()> {
 sqlx::query(r#"
 update rate_limit
 set request_count = request_count + 1, last_request_at = $2
 where key = $1
 "#)
 .bind(key)
 .bind(now)
 .execute(&mut **tx)
 .await
 .context("increment_window failed")?;
 Ok(())
}
