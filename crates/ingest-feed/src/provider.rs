//! Feed Adapter boundary.
//!
//! A polymorphic interface, one implementation per vendor feed. This
//! module defines **only** the query/item shapes, the error taxonomy, and
//! the `FeedAdapter` trait. Concrete adapters live in sibling modules
//! (`demo`, `nivoda`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ingest_schemas::IngestError;
use serde_json::Value;
use std::fmt;

/// A feed-defined query over the vendor's inventory, typically a
/// price range plus an `updated_from`/`updated_to` freshness window.
#[derive(Debug, Clone)]
pub struct FeedQuery {
 pub min_price_minor: i64,
 pub max_price_minor: i64,
 pub updated_from: Option<DateTime<Utc>>,
 pub updated_to: Option<DateTime<Utc>>,
}

/// One vendor record as returned verbatim by `search`.
#[derive(Debug, Clone)]
pub struct FeedItem {
 pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
 pub items: Vec<FeedItem>,
 pub total_count: i64,
}

/// Identity keys and payload extracted from one `FeedItem` (/// `extract_identity`). Deterministic; no side effects.
#[derive(Debug, Clone)]
pub struct ItemIdentity {
 pub supplier_stone_id: String,
 pub offer_id: String,
 pub payload: Value,
 pub source_updated_at: Option<DateTime<Utc>>,
}

/// Canonical fields derived from a raw payload (/// `map_raw_to_canonical`). A field left `None` must not overwrite an
/// existing non-null canonical value (carry-forward policy).
#[derive(Debug, Clone, Default)]
pub struct CanonicalFields {
 pub shape: Option<String>,
 pub carat: Option<f64>,
 pub color: Option<String>,
 pub clarity: Option<String>,
 pub cut: Option<String>,
 pub price_minor: i64,
 pub availability: Option<String>,
}

/// Errors a [`FeedAdapter`] may return, distinguishing retryable causes
/// (network, 5xx, 429) from fatal ones (4xx-other, config) #[derive(Debug)]
pub enum FeedAdapterError {
 Transport(String),
 RateLimited(String),
 Api { status: u16, message: String },
 Decode(String),
 Config(String),
}

impl fmt::Display for FeedAdapterError {
 fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
 match self {
 FeedAdapterError::Transport(msg) => write!(f, "transport error: {msg}"),
 FeedAdapterError::RateLimited(msg) => write!(f, "rate limited: {msg}"),
 FeedAdapterError::Api { status, message } => {
 write!(f, "feed api error status={status}: {message}")
 }
 FeedAdapterError::Decode(msg) => write!(f, "decode error: {msg}"),
 FeedAdapterError::Config(msg) => write!(f, "config error: {msg}"),
 }
 }
}

impl std::error::Error for FeedAdapterError {}

impl FeedAdapterError {
 pub fn is_retryable(&self) -> bool {
 match self {
 FeedAdapterError::Transport(_) | FeedAdapterError::RateLimited(_) => true,
 FeedAdapterError::Api { status, .. } => *status >= 500 || *status == 429,
 FeedAdapterError::Decode(_) | FeedAdapterError::Config(_) => false,
 }
 }
}

impl From<FeedAdapterError> for IngestError {
 fn from(err: FeedAdapterError) -> Self {
 if err.is_retryable {
 IngestError::Transient(err.to_string())
 } else {
 IngestError::Fatal(err.to_string())
 }
 }
}

/// Vendor-specific paginated search, count, and raw-to-canonical mapping
/// . Implementations must be `Send + Sync` so a
/// `Box<dyn FeedAdapter>` can be shared across worker tasks.
#[async_trait]
pub trait FeedAdapter: Send + Sync {
 /// Stable identifier for this feed, used as the `feed` column value
 /// and the `raw_{feed}` table suffix.
 fn feed_name(&self) -> &'static str;

 /// Hard cap on `search`'s `limit` parameter; callers must not exceed
 /// this even if they request more.
 fn max_page_size(&self) -> i64;

 /// `build_base_query` : the full-range or
 /// freshness-windowed query the heatmap partitioner and workers scan.
 fn build_base_query(&self, updated_from: Option<DateTime<Utc>>, updated_to: Option<DateTime<Utc>>) -> FeedQuery;

 /// Total records matching `query`, ignoring pagination.
 async fn count(&self, query: &FeedQuery) -> Result<i64, FeedAdapterError>;

 /// Paginated, stable-ordered search so offset-based resumption after a
 /// retry yields a superset of the prior delivery's rows.
 async fn search(&self, query: &FeedQuery, offset: i64, limit: i64) -> Result<SearchResult, FeedAdapterError>;

 /// Deterministic identity/payload extraction; must not perform I/O.
 fn extract_identity(&self, item: &FeedItem) -> Result<ItemIdentity, FeedAdapterError>;

 /// Pure mapping from a stored raw payload to canonical fields.
 fn map_raw_to_canonical(&self, payload: &Value) -> Result<CanonicalFields, FeedAdapterError>;
}

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn feed_adapter_error_display_api_with_status() {
 let err = FeedAdapterError::Api {
 status: 503,
 message: "upstream unavailable".to_string(),
 };
 assert_eq!(err.to_string(), "feed api error status=503: upstream unavailable");
 }

 #[test]
 fn retryable_classification_matches_spec() {
 assert!(FeedAdapterError::Transport("x".into()).is_retryable);
 assert!(FeedAdapterError::RateLimited("x".into()).is_retryable);
 assert!(FeedAdapterError::Api { status: 500, message: "x".into() }.is_retryable);
 assert!(FeedAdapterError::Api { status: 429, message: "x".into() }.is_retryable);
 assert!(!FeedAdapterError::Api { status: 404, message: "x".into() }.is_retryable);
 assert!(!FeedAdapterError::Decode("x".into()).is_retryable);
 assert!(!FeedAdapterError::Config("x".into()).is_retryable);
 }
}
