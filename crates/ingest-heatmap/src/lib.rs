//! ingest-heatmap
//!
//! The heatmap partitioner : turns a monolithic remote query
//! into price-bounded, near-equal-size partitions using only cheap
//! `count` calls, never full pagination. This is the distinctive
//! algorithm of the whole pipeline.

use futures_util::future::join_all;
use ingest_feed::{FeedAdapter, FeedAdapterError, FeedQuery};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct HeatmapConfig {
 /// Below this price, use fixed `dense_zone_step` partitions.
 pub dense_zone_threshold: i64,
 pub dense_zone_step: i64,
 /// Starting step size once past the dense zone.
 pub initial_step: i64,
 pub target_per_chunk: i64,
 /// Maximum step-halving/doubling refinements per partition.
 pub max_refinements: u32,
 /// Optional cap on total accumulated records before the scan stops early.
 pub max_records: Option<i64>,
 /// Bound on parallel scan workers across disjoint sub-ranges.
 pub max_scan_workers: usize,
}

impl Default for HeatmapConfig {
 fn default() -> Self {
 Self {
 dense_zone_threshold: 20_000,
 dense_zone_step: 100,
 initial_step: 500,
 target_per_chunk: 500,
 max_refinements: 6,
 max_records: None,
 max_scan_workers: 4,
 }
 }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeatmapPartition {
 pub partition_id: i32,
 pub min_price: i64,
 pub max_price: i64,
 pub total_records: i64,
}

#[derive(Debug)]
pub enum HeatmapError {
 Adapter(FeedAdapterError),
}

impl std::fmt::Display for HeatmapError {
 fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
 match self {
 HeatmapError::Adapter(e) => write!(f, "heatmap count failed: {e}"),
 }
 }
}

impl std::error::Error for HeatmapError {}

/// One proposed-then-accepted sub-range, produced sequentially by the
/// adaptive walk (step 2) before the parallel scan phase.
struct Candidate {
 min_price: i64,
 max_price: i64,
}

/// Walks the price axis left to right, producing candidate ranges without
/// yet knowing their counts (dense-zone ranges are fixed-width; above the
/// threshold the step adapts via `count` refinement, same loop, just
/// serialized so each decision sees the previous cursor).
async fn propose_candidates(adapter: &dyn FeedAdapter,
 base_query: &FeedQuery,
 config: &HeatmapConfig) -> Result<Vec<Candidate>, HeatmapError> {
 let p_max = base_query.max_price_minor;
 let mut cursor = base_query.min_price_minor;
 let mut candidates = Vec::new();
 let mut accumulated: i64 = 0;

 while cursor < p_max {
 if let Some(cap) = config.max_records {
 if accumulated >= cap {
 break;
 }
 }

 if cursor < config.dense_zone_threshold {
 let step = config.dense_zone_step.min(p_max - cursor);
 let max_price = cursor + step;
 let count = sub_range_count(adapter, base_query, cursor, max_price).await?;
 candidates.push(Candidate {
 min_price: cursor,
 max_price,
 });
 accumulated += count;
 cursor = max_price;
 continue;
 }

 let mut step = config.initial_step.max(1);
 let mut refinements = 0u32;
 let (accepted_max, accepted_count) = loop {
 let max_price = (cursor + step).min(p_max);
 let count = sub_range_count(adapter, base_query, cursor, max_price).await?;

 let at_limit = refinements >= config.max_refinements || max_price >= p_max;
 if count as f64 > 1.5 * config.target_per_chunk as f64 && !at_limit {
 step = (step / 2).max(1);
 refinements += 1;
 continue;
 }
 if (count as f64) < 0.5 * config.target_per_chunk as f64 && !at_limit {
 let doubled = step.saturating_mul(2);
 step = doubled.min(p_max - cursor).max(1);
 refinements += 1;
 continue;
 }
 break (max_price, count);
 };

 candidates.push(Candidate {
 min_price: cursor,
 max_price: accepted_max,
 });
 accumulated += accepted_count;
 cursor = accepted_max;
 }

 Ok(candidates)
}

async fn sub_range_count(adapter: &dyn FeedAdapter,
 base_query: &FeedQuery,
 min_price: i64,
 max_price: i64) -> Result<i64, HeatmapError> {
 let query = FeedQuery {
 min_price_minor: min_price,
 max_price_minor: max_price,
 updated_from: base_query.updated_from,
 updated_to: base_query.updated_to,
 };
 adapter.count(&query).await.map_err(HeatmapError::Adapter)
}

/// Runs the full heatmap scan: propose candidate ranges (sequential, since
/// each decision depends on the previous cursor), then count each
/// candidate in parallel across up to `max_scan_workers` concurrent calls,
/// preserving left-to-right order in the output (/// "Parallelism").
pub async fn scan(adapter: Arc<dyn FeedAdapter>,
 base_query: FeedQuery,
 config: HeatmapConfig) -> Result<Vec<HeatmapPartition>, HeatmapError> {
 let candidates = propose_candidates(adapter.as_ref(), &base_query, &config).await?;

 let chunks = candidates.chunks(config.max_scan_workers.max(1));
 let mut counted = Vec::with_capacity(candidates.len());
 for chunk in chunks {
 let futures = chunk.iter().map(|c| {
 let adapter = adapter.clone();
 let base_query = base_query.clone();
 async move { sub_range_count(adapter.as_ref(), &base_query, c.min_price, c.max_price).await }
 });
 for result in join_all(futures).await {
 counted.push(result?);
 }
 }

 let partitions = candidates
 .into_iter()
 .zip(counted)
 .enumerate()
 .map(|(i, (c, total_records))| HeatmapPartition {
 partition_id: i as i32,
 min_price: c.min_price,
 max_price: c.max_price,
 total_records,
 })
 .collect();

 Ok(partitions)
}

/// Drops zero-record partitions, then merges contiguous small partitions
/// until the count fits `max_workers` ("Output"). Returns an
/// empty list if `min_records_per_worker` cannot be met by a single
/// worker's share.
pub fn finalize_partitions(mut partitions: Vec<HeatmapPartition>,
 max_workers: usize,
 min_records_per_worker: i64) -> Vec<HeatmapPartition> {
 partitions.retain(|p| p.total_records > 0);

 while partitions.len() > max_workers.max(1) {
 let merge_at = smallest_adjacent_pair(&partitions);
 let (a, b) = (partitions.remove(merge_at), partitions.remove(merge_at));
 partitions.insert(merge_at,
 HeatmapPartition {
 partition_id: 0,
 min_price: a.min_price,
 max_price: b.max_price,
 total_records: a.total_records + b.total_records,
 });
 }

 for (i, p) in partitions.iter_mut().enumerate() {
 p.partition_id = i as i32;
 }

 let total: i64 = partitions.iter().map(|p| p.total_records).sum();
 if total > 0 && total < min_records_per_worker {
 return Vec::new();
 }

 partitions
}

fn smallest_adjacent_pair(partitions: &[HeatmapPartition]) -> usize {
 (0..partitions.len() - 1)
 .min_by_key(|&i| partitions[i].total_records + partitions[i + 1].total_records)
 .unwrap_or(0)
}

#[cfg(test)]
mod tests {
 use super::*;
 use async_trait::async_trait;
 use ingest_feed::{CanonicalFields, FeedItem, ItemIdentity, SearchResult};
 use std::sync::atomic::{AtomicU64, Ordering};

 /// Feed whose `count` reflects a fixed uniform density per unit
 /// price, so expected partition counts are computable by hand.
 struct UniformDensityFeed {
 density_per_unit: i64,
 p_max: i64,
 calls: AtomicU64,
 }

 #[async_trait]
 impl FeedAdapter for UniformDensityFeed {
 fn feed_name(&self) -> &'static str {
 "uniform-test"
 }
 fn max_page_size(&self) -> i64 {
 50
 }
 fn build_base_query(&self, _: Option<chrono::DateTime<chrono::Utc>>, _: Option<chrono::DateTime<chrono::Utc>>) -> FeedQuery {
 FeedQuery {
 min_price_minor: 0,
 max_price_minor: self.p_max,
 updated_from: None,
 updated_to: None,
 }
 }
 async fn count(&self, query: &FeedQuery) -> Result<i64, FeedAdapterError> {
 self.calls.fetch_add(1, Ordering::Relaxed);
 let width = (query.max_price_minor - query.min_price_minor).max(0);
 Ok(width * self.density_per_unit)
 }
 async fn search(&self, _: &FeedQuery, _: i64, _: i64) -> Result<SearchResult, FeedAdapterError> {
 Ok(SearchResult { items: Vec::new(), total_count: 0 })
 }
 fn extract_identity(&self, _item: &FeedItem) -> Result<ItemIdentity, FeedAdapterError> {
 unimplemented!
 }
 fn map_raw_to_canonical(&self, _payload: &serde_json::Value) -> Result<CanonicalFields, FeedAdapterError> {
 unimplemented!
 }
 }

 #[tokio::test]
 async fn partitions_tile_the_full_range_with_no_overlap() {
 let feed = Arc::new(UniformDensityFeed {
 density_per_unit: 1,
 p_max: 100_000,
 calls: AtomicU64::new(0),
 });
 let config = HeatmapConfig {
 dense_zone_threshold: 20_000,
 dense_zone_step: 1_000,
 initial_step: 500,
 target_per_chunk: 500,
 max_refinements: 6,
 max_records: None,
 max_scan_workers: 4,
 };
 let base_query = feed.build_base_query(None, None);
 let partitions = scan(feed.clone(), base_query, config).await.unwrap();

 assert_eq!(partitions.first().unwrap().min_price, 0);
 assert_eq!(partitions.last().unwrap().max_price, 100_000);
 for w in partitions.windows(2) {
 assert_eq!(w[0].max_price, w[1].min_price, "no gap or overlap between adjacent partitions");
 }
 }

 #[tokio::test]
 async fn sum_of_partition_counts_equals_total_count() {
 let feed = Arc::new(UniformDensityFeed {
 density_per_unit: 2,
 p_max: 50_000,
 calls: AtomicU64::new(0),
 });
 let config = HeatmapConfig::default();
 let base_query = feed.build_base_query(None, None);
 let total = feed.count(&base_query).await.unwrap();

 let partitions = scan(feed.clone(), base_query, config).await.unwrap();
 let sum: i64 = partitions.iter().map(|p| p.total_records).sum();
 assert_eq!(sum, total);
 }

 #[tokio::test]
 async fn accepted_partitions_respect_hard_cap_except_possibly_the_last() {
 let feed = Arc::new(UniformDensityFeed {
 density_per_unit: 1,
 p_max: 80_000,
 calls: AtomicU64::new(0),
 });
 let config = HeatmapConfig {
 dense_zone_threshold: 0,
 dense_zone_step: 100,
 initial_step: 400,
 target_per_chunk: 500,
 max_refinements: 6,
 max_records: None,
 max_scan_workers: 4,
 };
 let base_query = feed.build_base_query(None, None);
 let partitions = scan(feed, base_query, config).await.unwrap();
 let hard_cap = 2 * config.target_per_chunk;

 for (i, p) in partitions.iter().enumerate() {
 if i == partitions.len() - 1 {
 continue;
 }
 assert!(p.total_records <= hard_cap, "partition {i} exceeds hard cap: {}", p.total_records);
 }
 }

 #[tokio::test]
 async fn empty_feed_produces_empty_partition_list() {
 let feed = Arc::new(UniformDensityFeed {
 density_per_unit: 0,
 p_max: 0,
 calls: AtomicU64::new(0),
 });
 let base_query = feed.build_base_query(None, None);
 let partitions = scan(feed, base_query, HeatmapConfig::default()).await.unwrap();
 assert!(partitions.is_empty());
 }

 #[test]
 fn finalize_merges_down_to_max_workers() {
 let partitions = vec![
 HeatmapPartition { partition_id: 0, min_price: 0, max_price: 10, total_records: 5 },
 HeatmapPartition { partition_id: 1, min_price: 10, max_price: 20, total_records: 5 },
 HeatmapPartition { partition_id: 2, min_price: 20, max_price: 30, total_records: 5 },
 HeatmapPartition { partition_id: 3, min_price: 30, max_price: 40, total_records: 5 },
 ];
 let merged = finalize_partitions(partitions, 2, 0);
 assert_eq!(merged.len(), 2);
 assert_eq!(merged[0].min_price, 0);
 assert_eq!(merged[1].max_price, 40);
 }

 #[test]
 fn finalize_drops_below_min_records_per_worker() {
 let partitions = vec![HeatmapPartition { partition_id: 0, min_price: 0, max_price: 10, total_records: 3 }];
 let merged = finalize_partitions(partitions, 10, 100);
 assert!(merged.is_empty());
 }

 #[test]
 fn finalize_drops_zero_record_partitions() {
 let partitions = vec![
 HeatmapPartition { partition_id: 0, min_price: 0, max_price: 10, total_records: 0 },
 HeatmapPartition { partition_id: 1, min_price: 10, max_price: 20, total_records: 5 },
 ];
 let merged = finalize_partitions(partitions, 10, 0);
 assert_eq!(merged.len(), 1);
 assert_eq!(merged[0].total_records, 5);
 }
}
