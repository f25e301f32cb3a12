//! ingest-feed
//!
//! Feed Adapter boundary : vendor-specific paginated
//! search/count and raw-to-canonical mapping. Adapter polymorphism is a
//! small closed trait; concrete variants are registered in a lookup map
//! at startup rather than resolved by import-time coupling.

pub mod demo;
pub mod nivoda;
pub mod provider;

pub use demo::DemoFeedAdapter;
pub use nivoda::NivodaFeedAdapter;
pub use provider::{
 CanonicalFields, FeedAdapter, FeedAdapterError, FeedItem, FeedQuery, ItemIdentity, SearchResult,
};

use std::collections::HashMap;
use std::sync::Arc;

/// Registry of feed adapters keyed by `feed_name`, built once at process
/// startup and shared across Scheduler/Worker/Consolidator.
#[derive(Clone, Default)]
pub struct FeedRegistry {
 adapters: HashMap<&'static str, Arc<dyn FeedAdapter>>,
}

impl FeedRegistry {
 pub fn new() -> Self {
 Self::default()
 }

 pub fn register(&mut self, adapter: Arc<dyn FeedAdapter>) {
 self.adapters.insert(adapter.feed_name(), adapter);
 }

 pub fn get(&self, feed: &str) -> Option<Arc<dyn FeedAdapter>> {
 self.adapters.get(feed).cloned()
 }
}
