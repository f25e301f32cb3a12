//! ingest-cache
//!
//! In-process Response Cache fronting `diamonds` search:
//! LRU+TTL, entries version-stamped at insert time against a composite
//! string across every feed's `dataset_versions` row, so a Consolidator
//! version bump invalidates every cached page for that feed the next time
//! it's looked up — no proactive sweep needed.

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CacheConfig {
 pub capacity: usize,
 pub ttl: Duration,
 pub poll_interval: std::time::Duration,
}

impl Default for CacheConfig {
 fn default() -> Self {
 Self {
 capacity: 1_000,
 ttl: Duration::seconds(30),
 poll_interval: std::time::Duration::from_secs(60),
 }
 }
}

/// The subset of `DiamondSearch` params that identify a cacheable query.
/// Pagination/sort keys are deliberately excluded from this type so two
/// requests differing only in `offset` don't fragment the cache key space
/// beyond what callers choose to key on.
#[derive(Debug, Clone, Serialize, Default)]
pub struct CacheKeyParams {
 pub feed: Option<String>,
 pub shape: Option<String>,
 pub min_price_minor: Option<i64>,
 pub max_price_minor: Option<i64>,
}

/// Canonicalizes `params` (sorted keys, nulls dropped) and hashes it to a
/// stable 16-hex-char fingerprint, the same canonicalize-then-hash shape
/// used for layered config hashing elsewhere in this workspace.
pub fn fingerprint(params: &CacheKeyParams) -> String {
 let value = serde_json::to_value(params).expect("CacheKeyParams always serializes");
 let canonical = canonicalize(&value);
 let mut hasher = Sha256::new();
 hasher.update(canonical.as_bytes());
 let digest = hasher.finalize();
 hex::encode(&digest[..8])
}

fn canonicalize(value: &serde_json::Value) -> String {
 fn strip_nulls(value: &serde_json::Value) -> Option<serde_json::Value> {
 match value {
 serde_json::Value::Null => None,
 serde_json::Value::Object(map) => {
 let sorted: BTreeMap<String, serde_json::Value> = map
 .iter()
 .filter_map(|(k, v)| strip_nulls(v).map(|v| (k.clone(), v)))
 .collect();
 Some(serde_json::to_value(sorted).expect("map of values always serializes"))
 }
 serde_json::Value::Array(items) => {
 let mut stripped: Vec<serde_json::Value> = items.iter().filter_map(strip_nulls).collect();
 stripped.sort_by_key(|v| v.to_string());
 Some(serde_json::Value::Array(stripped))
 }
 other => Some(other.clone()),
 }
 }
 strip_nulls(value).unwrap_or(serde_json::Value::Null).to_string()
}

#[derive(Debug, Clone)]
struct CacheEntry {
 value: serde_json::Value,
 version_at_insert: String,
 inserted_at: DateTime<Utc>,
}

struct Inner {
 lru: LruCache<String, CacheEntry>,
 composite_version: String,
}

/// Thread-safe LRU+TTL cache, version-gated against `dataset_versions`.
pub struct ResponseCache {
 inner: Mutex<Inner>,
 ttl: Duration,
}

impl ResponseCache {
 pub fn new(config: &CacheConfig) -> Self {
 let capacity = NonZeroUsize::new(config.capacity.max(1)).expect("capacity clamped to >= 1");
 Self {
 inner: Mutex::new(Inner {
 lru: LruCache::new(capacity),
 composite_version: String::new(),
 }),
 ttl: config.ttl,
 }
 }

 /// Returns the cached value for `params` if present, unexpired, and
 /// stamped with the current composite version; evicts and returns
 /// `None` otherwise.
 pub fn get(&self, params: &CacheKeyParams) -> Option<serde_json::Value> {
 let key = fingerprint(params);
 let mut inner = self.inner.lock();
 let current_version = inner.composite_version.clone();
 let entry = inner.lru.get(&key)?;
 let expired = Utc::now() - entry.inserted_at > self.ttl;
 let stale = entry.version_at_insert != current_version;
 if expired || stale {
 inner.lru.pop(&key);
 return None;
 }
 Some(entry.value.clone())
 }

 pub fn put(&self, params: &CacheKeyParams, value: serde_json::Value) {
 let key = fingerprint(params);
 let mut inner = self.inner.lock();
 let version_at_insert = inner.composite_version.clone();
 inner.lru.put(key,
 CacheEntry {
 value,
 version_at_insert,
 inserted_at: Utc::now(),
 });
 }

 fn set_composite_version(&self, composite: String) {
 self.inner.lock().composite_version = composite;
 }

 pub fn composite_version(&self) -> String {
 self.inner.lock().composite_version.clone()
 }

 pub fn len(&self) -> usize {
 self.inner.lock().lru.len()
 }

 pub fn is_empty(&self) -> bool {
 self.len() == 0
 }
}

/// Sorted `"feed:version"` pairs joined by commas — stable regardless of
/// `dataset_versions` row insertion order.
fn build_composite_version(versions: &[ingest_schemas::DatasetVersion]) -> String {
 let mut pairs: Vec<String> = versions.iter().map(|v| format!("{}:{}", v.feed, v.version)).collect();
 pairs.sort();
 pairs.join(",")
}

/// Background task: refreshes the cache's composite version from
/// `dataset_versions` every `poll_interval` until cancelled. Runs as a
/// detached lifecycle task the daemon races against its shutdown signal,
/// never blocking request handling.
pub async fn run_version_poller(pool: PgPool, cache: Arc<ResponseCache>, poll_interval: std::time::Duration) {
 let mut ticker = tokio::time::interval(poll_interval);
 loop {
 ticker.tick().await;
 match ingest_db::get_all_versions(&pool).await {
 Ok(versions) => cache.set_composite_version(build_composite_version(&versions)),
 Err(e) => tracing::warn!(error = %e, "dataset version poll failed"),
 }
 }
}
