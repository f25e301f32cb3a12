use serde_json::json;

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
async fn claim_batch_is_exclusive_and_expired_claims_sweep_back_to_pending() -> anyhow::Result<()> {
 let url = skip_if_no_db!();
 let pool = ingest_db::connect(&url).await?;
 ingest_db::migrate(&pool).await?;

 ingest_db::upsert_raw_row(&pool,
 "demo",
 &ingest_db::RawRowUpsert {
 supplier_stone_id: "S-CLAIM-1".to_string(),
 offer_id: "O-1".to_string(),
 payload: json!({"price": 10000}),
 source_updated_at: chrono::Utc::now(),
 })
 .await?;

 let batch = ingest_db::claim_batch(&pool, "demo", 10, chrono::Duration::seconds(0)).await?;
 assert!(batch.iter().any(|r| r.supplier_stone_id == "S-CLAIM-1"));

 let second = ingest_db::claim_batch(&pool, "demo", 10, chrono::Duration::minutes(5)).await?;
 assert!(!second.iter().any(|r| r.supplier_stone_id == "S-CLAIM-1"));

 let swept = ingest_db::sweep_expired_claims(&pool, "demo").await?;
 assert!(swept >= 1);

 Ok(())
}

#[tokio::test]
async fn diamond_upsert_carries_forward_null_fields_and_soft_delete_is_reversible() -> anyhow::Result<()> {
 let url = skip_if_no_db!();
 let pool = ingest_db::connect(&url).await?;
 ingest_db::migrate(&pool).await?;

 let mut tx = pool.begin().await?;
 ingest_db::upsert_diamond(&mut tx,
 &ingest_db::DiamondUpsert {
 feed: "demo".to_string(),
 supplier_stone_id: "S-CF-1".to_string(),
 offer_id: "O-CF-1".to_string(),
 shape: Some("round".to_string()),
 carat: Some(1.2),
 color: Some("D".to_string()),
 clarity: Some("VS1".to_string()),
 cut: Some("excellent".to_string()),
 price_minor: 500_000,
 availability: Some("in_stock".to_string()),
 source_updated_at: chrono::Utc::now(),
 })
 .await?;
 tx.commit().await?;

 // Re-upsert with a null `shape`: must not erase the previously known value.
 let mut tx = pool.begin().await?;
 ingest_db::upsert_diamond(&mut tx,
 &ingest_db::DiamondUpsert {
 feed: "demo".to_string(),
 supplier_stone_id: "S-CF-1".to_string(),
 offer_id: "O-CF-1".to_string(),
 shape: None,
 carat: Some(1.2),
 color: Some("D".to_string()),
 clarity: Some("VS1".to_string()),
 cut: Some("excellent".to_string()),
 price_minor: 510_000,
 availability: Some("in_stock".to_string()),
 source_updated_at: chrono::Utc::now(),
 })
 .await?;
 let deleted = ingest_db::soft_delete_absent(&mut tx, "demo", &[]).await?;
 tx.commit().await?;
 assert!(deleted >= 1);

 let gone = ingest_db::get_active_diamond(&pool, "demo", "S-CF-1").await?;
 assert!(gone.is_none(), "soft-deleted diamond must not be active");

 // Re-ingest revives it.
 let mut tx = pool.begin().await?;
 ingest_db::upsert_diamond(&mut tx,
 &ingest_db::DiamondUpsert {
 feed: "demo".to_string(),
 supplier_stone_id: "S-CF-1".to_string(),
 offer_id: "O-CF-1".to_string(),
 shape: None,
 carat: Some(1.2),
 color: Some("D".to_string()),
 clarity: Some("VS1".to_string()),
 cut: Some("excellent".to_string()),
 price_minor: 520_000,
 availability: Some("in_stock".to_string()),
 source_updated_at: chrono::Utc::now(),
 })
 .await?;
 tx.commit().await?;

 let revived = ingest_db::get_active_diamond(&pool, "demo", "S-CF-1").await?.unwrap();
 assert_eq!(revived.shape.as_deref(), Some("round"));

 Ok(())
}

#[tokio::test]
async fn dataset_version_bump_is_atomic_with_soft_delete() -> anyhow::Result<()> {
 let url = skip_if_no_db!();
 let pool = ingest_db::connect(&url).await?;
 ingest_db::migrate(&pool).await?;

 let before = ingest_db::get_version(&pool, "demo").await?;

 let mut tx = pool.begin().await?;
 ingest_db::soft_delete_absent(&mut tx, "demo", &[]).await?;
 let bumped = ingest_db::bump_version(&mut tx, "demo").await?;
 tx.commit().await?;

 assert_eq!(bumped, before + 1);
 assert_eq!(ingest_db::get_version(&pool, "demo").await?, bumped);

 Ok(())
}
