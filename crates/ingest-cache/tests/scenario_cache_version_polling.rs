use ingest_cache::{CacheConfig, CacheKeyParams, ResponseCache};
use std::sync::Arc;

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
async fn cache_hit_survives_until_a_consolidator_version_bump_invalidates_it() -> anyhow::Result<()> {
 let url = skip_if_no_db!();
 let pool = ingest_db::connect(&url).await?;
 ingest_db::migrate(&pool).await?;

 let cache = Arc::new(ResponseCache::new(&CacheConfig::default()));
 let poller = tokio::spawn(ingest_cache::run_version_poller(pool.clone(),
 Arc::clone(&cache),
 std::time::Duration::from_millis(20)));

 // Let the poller establish a baseline composite version before caching.
 tokio::time::sleep(std::time::Duration::from_millis(60)).await;

 let params = CacheKeyParams {
 feed: Some("demo".to_string()),
 shape: None,
 min_price_minor: Some(0),
 max_price_minor: Some(1000),
 };
 cache.put(&params, serde_json::json!({"rows": [1, 2, 3]}));
 assert!(cache.get(&params).is_some());

 let mut tx = pool.begin().await?;
 ingest_db::bump_version(&mut tx, "demo").await?;
 tx.commit().await?;

 tokio::time::sleep(std::time::Duration::from_millis(60)).await;
 assert!(cache.get(&params).is_none(), "bumped version must invalidate the cached page");

 poller.abort();
 Ok(())
}
