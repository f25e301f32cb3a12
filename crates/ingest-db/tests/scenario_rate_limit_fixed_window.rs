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
async fn fixed_window_blocks_once_exhausted_then_rolls_over() -> anyhow::Result<()> {
 let url = skip_if_no_db!();
 let pool = ingest_db::connect(&url).await?;
 ingest_db::migrate(&pool).await?;

 let key = format!("test-feed-{}", uuid::Uuid::new_v4());
 let window = chrono::Duration::milliseconds(200);

 let d1 = ingest_db::try_acquire(&pool, &key, 2, window).await?;
 assert!(d1.allowed);
 let d2 = ingest_db::try_acquire(&pool, &key, 2, window).await?;
 assert!(d2.allowed);
 let d3 = ingest_db::try_acquire(&pool, &key, 2, window).await?;
 assert!(!d3.allowed, "third request within the window must be refused");

 tokio::time::sleep(std::time::Duration::from_millis(250)).await;

 let d4 = ingest_db::try_acquire(&pool, &key, 2, window).await?;
 assert!(d4.allowed, "window rollover must reset the counter");
 assert_eq!(d4.request_count, 1);

 Ok(())
}

#[tokio::test]
async fn concurrent_acquires_on_same_key_serialize_without_overrun() -> anyhow::Result<()> {
 let url = skip_if_no_db!();
 let pool = ingest_db::connect(&url).await?;
 ingest_db::migrate(&pool).await?;

 let key = format!("test-feed-concurrent-{}", uuid::Uuid::new_v4());
 let window = chrono::Duration::seconds(30);

 let mut handles = Vec::new();
 for _ in 0..10 {
 let pool = pool.clone();
 let key = key.clone();
 handles.push(tokio::spawn(async move {
 ingest_db::try_acquire(&pool, &key, 5, window).await
 }));
 }

 let mut allowed = 0;
 for h in handles {
 if h.await??.allowed {
 allowed += 1;
 }
 }

 assert_eq!(allowed, 5, "at most max_requests may be allowed regardless of race");
 Ok(())
}
