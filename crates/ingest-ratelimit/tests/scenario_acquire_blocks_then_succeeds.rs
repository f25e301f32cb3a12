use ingest_ratelimit::{acquire, RateLimitConfig};
use std::time::Duration;

#[tokio::test]
async fn five_concurrent_acquires_drain_across_two_windows() -> anyhow::Result<()> {
 let url = match std::env::var(ingest_db::ENV_DB_URL) {
 Ok(v) => v,
 Err(_) => {
 eprintln!("SKIP: INGEST_DATABASE_URL not set");
 return Ok(());
 }
 };
 let pool = ingest_db::connect(&url).await?;
 ingest_db::migrate(&pool).await?;

 let key = format!("test-acquire-{}", uuid::Uuid::new_v4());
 let config = RateLimitConfig {
 max_requests: 2,
 window: chrono::Duration::milliseconds(1000),
 max_wait: Duration::from_secs(5),
 base_delay: Duration::from_millis(50),
 max_jitter: Duration::from_millis(10),
 };

 let started = tokio::time::Instant::now();
 let mut handles = Vec::new();
 for _ in 0..5 {
 let pool = pool.clone();
 let key = key.clone();
 handles.push(tokio::spawn(async move { acquire(&pool, &key, &config).await }));
 }

 for h in handles {
 h.await??;
 }

 assert!(started.elapsed() < Duration::from_secs(5), "all five must finish within max_wait");
 Ok(())
}
