//! ingest-ratelimit
//!
//! Global fixed-window token bucket over the shared Postgres store
//! . The atomic `FOR UPDATE` decision lives in
//! `ingest-db::rate_limit`; this crate owns the `acquire` retry loop:
//! exponential backoff with jitter up to `max_wait_ms`, after which the
//! caller gets `RateLimitExceeded`.

use ingest_schemas::{IngestError, IngestResult};
use rand::Rng;
use sqlx::PgPool;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
 pub max_requests: i32,
 pub window: chrono::Duration,
 pub max_wait: Duration,
 pub base_delay: Duration,
 pub max_jitter: Duration,
}

impl Default for RateLimitConfig {
 /// Defaults N=2, W=1000ms, max_wait_ms=30s,
 /// base_delay=100ms, jitter<=50ms.
 fn default() -> Self {
 Self {
 max_requests: 2,
 window: chrono::Duration::milliseconds(1000),
 max_wait: Duration::from_secs(30),
 base_delay: Duration::from_millis(100),
 max_jitter: Duration::from_millis(50),
 }
 }
}

#[derive(Debug, Clone, Copy)]
pub struct AcquireOutcome {
 pub acquired: bool,
 pub current_count: i32,
 pub wait_ms: Option<u64>,
}

/// Single non-blocking attempt (`try_acquire`).
pub async fn try_acquire(pool: &PgPool, key: &str, config: &RateLimitConfig) -> IngestResult<AcquireOutcome> {
 let decision = ingest_db::try_acquire(pool, key, config.max_requests, config.window)
 .await
 .map_err(|e| IngestError::Transient(e.to_string()))?;

 if decision.allowed {
 return Ok(AcquireOutcome {
 acquired: true,
 current_count: decision.request_count,
 wait_ms: None,
 });
 }

 let elapsed = chrono::Utc::now() - decision.window_start;
 let remaining = config.window - elapsed;
 let wait_ms = remaining.num_milliseconds().max(0) as u64;
 Ok(AcquireOutcome {
 acquired: false,
 current_count: decision.request_count,
 wait_ms: Some(wait_ms),
 })
}

/// Blocks up to `config.max_wait` via repeated `try_acquire` with
/// exponential backoff and uniform jitter (`acquire`).
/// Returns `RateLimitExceeded` if the budget is exhausted first.
pub async fn acquire(pool: &PgPool, key: &str, config: &RateLimitConfig) -> IngestResult<()> {
 let deadline = tokio::time::Instant::now() + config.max_wait;
 let mut attempt: u32 = 0;

 loop {
 let outcome = try_acquire(pool, key, config).await?;
 if outcome.acquired {
 return Ok(());
 }

 if tokio::time::Instant::now() >= deadline {
 return Err(IngestError::RateLimitExceeded(format!("key={key} exceeded max_wait={:?}",
 config.max_wait)));
 }

 let backoff = config.base_delay.saturating_mul(1u32 << attempt.min(10));
 let jitter_ms = rand::thread_rng().gen_range(0..=config.max_jitter.as_millis() as u64);
 let sleep_for = backoff
 .saturating_add(Duration::from_millis(jitter_ms))
 .min(deadline.saturating_duration_since(tokio::time::Instant::now()));

 tracing::debug!(key, attempt, wait_ms = sleep_for.as_millis() as u64, "rate limit backoff");
 tokio::time::sleep(sleep_for).await;
 attempt += 1;
 }
}

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn default_config_matches_spec_defaults() {
 let cfg = RateLimitConfig::default();
 assert_eq!(cfg.max_requests, 2);
 assert_eq!(cfg.window, chrono::Duration::milliseconds(1000));
 assert_eq!(cfg.max_wait, Duration::from_secs(30));
 assert_eq!(cfg.base_delay, Duration::from_millis(100));
 assert_eq!(cfg.max_jitter, Duration::from_millis(50));
 }
}
