//! Deterministic in-process feed used for local development and the
//! concrete scenario in scenario 1 (seed=42, 100 000 rows,
//! prices in [800, 90 000]).
//!
//! The demo seeder's byte-for-byte draw sequence is reference-only
//! (open question (a)): this generator reproduces the same
//! *shape* of data (deterministic given a seed, monotonic id ordering,
//! the documented price range) without claiming equivalence to any other
//! language's RNG draw count.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::provider::{
 CanonicalFields, FeedAdapter, FeedAdapterError, FeedItem, FeedQuery, ItemIdentity, SearchResult,
};

const SHAPES: &[&str] = &["round", "princess", "cushion", "oval", "emerald", "pear"];
const COLORS: &[&str] = &["D", "E", "F", "G", "H", "I"];
const CLARITIES: &[&str] = &["FL", "VVS1", "VVS2", "VS1", "VS2", "SI1"];
const CUTS: &[&str] = &["excellent", "very_good", "good"];

/// A small xorshift PRNG so the generator needs no external `rand` crate
/// dependency and is trivially reproducible across runs.
struct Xorshift64 {
 state: u64,
}

impl Xorshift64 {
 fn new(seed: u64) -> Self {
 Self {
 state: seed.max(1),
 }
 }

 fn next_u64(&mut self) -> u64 {
 let mut x = self.state;
 x ^= x << 13;
 x ^= x >> 7;
 x ^= x << 17;
 self.state = x;
 x
 }

 fn next_range(&mut self, low: i64, high_inclusive: i64) -> i64 {
 let span = (high_inclusive - low + 1) as u64;
 low + (self.next_u64() % span) as i64
 }

 fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
 &items[(self.next_u64() as usize) % items.len()]
 }
}

#[derive(Debug, Clone, Copy)]
struct DemoRecord {
 index: u64,
 price_minor: i64,
 shape: &'static str,
 carat: f64,
 color: &'static str,
 clarity: &'static str,
 cut: &'static str,
}

pub struct DemoFeedAdapter {
 seed: u64,
 row_count: u64,
 min_price_minor: i64,
 max_price_minor: i64,
}

impl Default for DemoFeedAdapter {
 fn default() -> Self {
 Self::new(42, 100_000)
 }
}

impl DemoFeedAdapter {
 pub fn new(seed: u64, row_count: u64) -> Self {
 Self {
 seed,
 row_count,
 min_price_minor: 800_00,
 max_price_minor: 90_000_00,
 }
 }

 /// Regenerates the full deterministic table. Re-derivable from `seed`
 /// alone; never persisted between calls, matching a fixture generator
 /// rather than a stateful mock.
 fn generate_all(&self) -> Vec<DemoRecord> {
 let mut rng = Xorshift64::new(self.seed);
 let mut records = Vec::with_capacity(self.row_count as usize);
 for index in 0..self.row_count {
 let price_minor = rng.next_range(self.min_price_minor, self.max_price_minor);
 records.push(DemoRecord {
 index,
 price_minor,
 shape: rng.pick(SHAPES),
 carat: rng.next_range(20, 500) as f64 / 100.0,
 color: rng.pick(COLORS),
 clarity: rng.pick(CLARITIES),
 cut: rng.pick(CUTS),
 });
 }
 records.sort_by_key(|r| (r.price_minor, r.index));
 records
 }

 fn matching(&self, query: &FeedQuery) -> Vec<DemoRecord> {
 self.generate_all()
 .into_iter()
 .filter(|r| r.price_minor >= query.min_price_minor && r.price_minor <= query.max_price_minor)
 .collect()
 }
}

#[async_trait]
impl FeedAdapter for DemoFeedAdapter {
 fn feed_name(&self) -> &'static str {
 "demo"
 }

 fn max_page_size(&self) -> i64 {
 50
 }

 fn build_base_query(&self,
 updated_from: Option<chrono::DateTime<Utc>>,
 updated_to: Option<chrono::DateTime<Utc>>) -> FeedQuery {
 FeedQuery {
 min_price_minor: self.min_price_minor,
 max_price_minor: self.max_price_minor,
 updated_from,
 updated_to,
 }
 }

 async fn count(&self, query: &FeedQuery) -> Result<i64, FeedAdapterError> {
 Ok(self.matching(query).len() as i64)
 }

 async fn search(&self, query: &FeedQuery, offset: i64, limit: i64) -> Result<SearchResult, FeedAdapterError> {
 let limit = limit.min(self.max_page_size());
 let all = self.matching(query);
 let total_count = all.len() as i64;
 let start = offset.max(0) as usize;
 let end = (start + limit.max(0) as usize).min(all.len());
 let items = if start >= all.len() {
 Vec::new()
 } else {
 all[start..end]
 .iter()
 .map(|r| FeedItem {
 payload: json!({
 "supplier_stone_id": format!("DEMO-{:08}", r.index),
 "offer_id": format!("OFFER-{:08}", r.index),
 "shape": r.shape,
 "carat": r.carat,
 "color": r.color,
 "clarity": r.clarity,
 "cut": r.cut,
 "price_minor": r.price_minor,
 "availability": "in_stock",
 }),
 })
 .collect()
 };
 Ok(SearchResult { items, total_count })
 }

 fn extract_identity(&self, item: &FeedItem) -> Result<ItemIdentity, FeedAdapterError> {
 let supplier_stone_id = item
 .payload
 .get("supplier_stone_id")
 .and_then(|v| v.as_str())
 .ok_or_else(|| FeedAdapterError::Decode("missing supplier_stone_id".to_string()))?
 .to_string();
 let offer_id = item
 .payload
 .get("offer_id")
 .and_then(|v| v.as_str())
 .ok_or_else(|| FeedAdapterError::Decode("missing offer_id".to_string()))?
 .to_string();
 Ok(ItemIdentity {
 supplier_stone_id,
 offer_id,
 payload: item.payload.clone(),
 source_updated_at: Some(Utc::now()),
 })
 }

 fn map_raw_to_canonical(&self, payload: &serde_json::Value) -> Result<CanonicalFields, FeedAdapterError> {
 let price_minor = payload
 .get("price_minor")
 .and_then(|v| v.as_i64())
 .ok_or_else(|| FeedAdapterError::Decode("missing price_minor".to_string()))?;
 Ok(CanonicalFields {
 shape: payload.get("shape").and_then(|v| v.as_str()).map(str::to_string()),
 carat: payload.get("carat").and_then(|v| v.as_f64()),
 color: payload.get("color").and_then(|v| v.as_str()).map(str::to_string()),
 clarity: payload.get("clarity").and_then(|v| v.as_str()).map(str::to_string()),
 cut: payload.get("cut").and_then(|v| v.as_str()).map(str::to_string()),
 price_minor,
 availability: payload.get("availability").and_then(|v| v.as_str()).map(str::to_string()),
 })
 }
}

#[cfg(test)]
mod tests {
 use super::*;

 #[tokio::test]
 async fn same_seed_produces_same_total_count() {
 let adapter = DemoFeedAdapter::new(42, 1_000);
 let query = adapter.build_base_query(None, None);
 let a = adapter.count(&query).await.unwrap();
 let b = adapter.count(&query).await.unwrap();
 assert_eq!(a, b);
 assert_eq!(a, 1_000);
 }

 #[tokio::test]
 async fn search_is_stable_ordered_across_repeated_calls() {
 let adapter = DemoFeedAdapter::new(42, 500);
 let query = adapter.build_base_query(None, None);
 let first = adapter.search(&query, 0, 50).await.unwrap();
 let second = adapter.search(&query, 0, 50).await.unwrap();
 assert_eq!(first.items.len(), second.items.len());
 for (a, b) in first.items.iter().zip(second.items.iter()) {
 assert_eq!(a.payload, b.payload);
 }
 }

 #[tokio::test]
 async fn pagination_covers_every_row_with_no_gaps() {
 let adapter = DemoFeedAdapter::new(42, 137);
 let query = adapter.build_base_query(None, None);
 let total = adapter.count(&query).await.unwrap();

 let mut seen = std::collections::HashSet::new();
 let mut offset = 0i64;
 loop {
 let page = adapter.search(&query, offset, 30).await.unwrap();
 if page.items.is_empty() {
 break;
 }
 for item in &page.items {
 let id = adapter.extract_identity(item).unwrap().supplier_stone_id;
 seen.insert(id);
 }
 offset += page.items.len() as i64;
 if offset >= total {
 break;
 }
 }
 assert_eq!(seen.len() as i64, total);
 }

 #[test]
 fn map_raw_to_canonical_requires_price() {
 let adapter = DemoFeedAdapter::default();
 let err = adapter.map_raw_to_canonical(&json!({})).unwrap_err();
 assert!(matches!(err, FeedAdapterError::Decode(_)));
 }
}
