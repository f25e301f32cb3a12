//! ingest-testkit
//!
//! Test doubles and fixture builders shared across scenario tests, so
//! crates that only need a `WatermarkStore` or a row of fixture data don't
//! each re-invent one. A true in-memory substitute for the relational
//! store itself is deliberately not attempted here: the rate limiter and
//! CAS partition transitions are exercised against their real `FOR UPDATE`
//! locking semantics, which an in-memory stand-in would not reproduce
//! faithfully — those scenario tests instead skip when `INGEST_DATABASE_URL`
//! is unset, the same convention `ingest-db`'s own tests use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ingest_blob::WatermarkStore;
use ingest_schemas::{IngestResult, Watermark};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// In-memory `WatermarkStore`: one `Watermark` per feed, guarded by a
/// `std::sync::Mutex` since reads/writes are brief and never held across
/// an `.await`.
#[derive(Default)]
pub struct InMemoryWatermarkStore {
 inner: Mutex<HashMap<String, Watermark>>,
}

impl InMemoryWatermarkStore {
 pub fn new() -> Self {
 Self::default()
 }

 /// Seed a feed's watermark without going through the trait, for test
 /// setup that needs to start from a known incremental baseline.
 pub fn seed(&self, feed: &str, watermark: Watermark) {
 self.inner.lock().unwrap().insert(feed.to_string(), watermark);
 }
}

#[async_trait]
impl WatermarkStore for InMemoryWatermarkStore {
 async fn read(&self, feed: &str) -> IngestResult<Option<Watermark>> {
 Ok(self.inner.lock().unwrap().get(feed).cloned())
 }

 async fn write(&self, feed: &str, watermark: &Watermark) -> IngestResult<()> {
 self.inner.lock().unwrap().insert(feed.to_string(), watermark.clone());
 Ok(())
 }
}

/// A deterministic `Watermark` fixture: `last_updated_at` set `age` before
/// now, with a fresh synthetic `run_id`.
pub fn fixture_watermark(age: chrono::Duration) -> Watermark {
 Watermark {
 last_updated_at: Utc::now() - age,
 last_run_id: Some(Uuid::new_v4()),
 last_run_completed_at: Some(Utc::now() - age),
 }
}

/// A minimal raw-row JSON payload for `DemoFeedAdapter`-shaped tests:
/// `{"id": "...", "offer_id": "...", "price_minor": N}`.
pub fn fixture_raw_payload(supplier_stone_id: &str, offer_id: &str, price_minor: i64) -> serde_json::Value {
 serde_json::json!({
 "id": supplier_stone_id,
 "offer_id": offer_id,
 "price_minor": price_minor,
 "updated_at": DateTime::<Utc>::from(Utc::now()),
 })
}

/// A single-partition `Full` run fixture, ready for `ingest_db::insert_run`
/// + `insert_partitions`, sized to whatever `total_records` the caller
/// wants the one partition to claim to cover.
pub fn fixture_full_run(feed: &str, total_records: i64) -> (ingest_db::NewRun, ingest_db::NewPartition) {
 let run_id = Uuid::new_v4();
 let run = ingest_db::NewRun {
 run_id,
 feed: feed.to_string(),
 run_type: ingest_schemas::RunType::Full,
 expected_workers: 1,
 watermark_before: None,
 watermark_after: Utc::now(),
 };
 let partition = ingest_db::NewPartition {
 partition_id: 0,
 min_price: 0,
 max_price: i64::MAX,
 total_records,
 work_item_payload: serde_json::json!({
 "run_id": run_id,
 "partition_id": 0,
 "min_price": 0,
 "max_price": i64::MAX,
 }),
 };
 (run, partition)
}

#[cfg(test)]
mod tests {
 use super::*;

 #[tokio::test]
 async fn in_memory_store_round_trips_a_watermark() {
 let store = InMemoryWatermarkStore::new();
 assert!(store.read("demo").await.unwrap().is_none());

 let watermark = fixture_watermark(chrono::Duration::minutes(30));
 store.write("demo", &watermark).await.unwrap();

 let read_back = store.read("demo").await.unwrap().unwrap();
 assert_eq!(read_back, watermark);
 }

 #[tokio::test]
 async fn seed_bypasses_the_trait_for_setup() {
 let store = InMemoryWatermarkStore::new();
 let watermark = fixture_watermark(chrono::Duration::hours(1));
 store.seed("demo", watermark.clone());

 assert_eq!(store.read("demo").await.unwrap(), Some(watermark));
 }
}
