//! HTTP-backed feed adapter for the Nivoda diamond inventory API
//! . Re-authenticates transparently using a cached token
//! refreshed with a safety buffer shorter than its declared lifetime, so
//! workers never observe a mid-page auth expiry as a fatal error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::provider::{
 CanonicalFields, FeedAdapter, FeedAdapterError, FeedItem, FeedQuery, ItemIdentity, SearchResult,
};

const TOKEN_SAFETY_BUFFER_SECS: i64 = 60;

struct CachedToken {
 value: String,
 expires_at: DateTime<Utc>,
}

pub struct NivodaFeedAdapter {
 username: String,
 password: String,
 http: reqwest::Client,
 base_url: String,
 token: RwLock<Option<CachedToken>>,
}

impl NivodaFeedAdapter {
 pub fn new(username: String, password: String) -> Self {
 Self::new_with_base_url(username, password, "https://api.nivoda.net".to_string())
 }

 pub fn new_with_base_url(username: String, password: String, base_url: String) -> Self {
 Self {
 username,
 password,
 http: reqwest::Client::new(),
 base_url,
 token: RwLock::new(None),
 }
 }

 async fn authenticated_token(&self) -> Result<String, FeedAdapterError> {
 {
 let guard = self.token.read().await;
 if let Some(cached) = guard.as_ref() {
 if cached.expires_at - chrono::Duration::seconds(TOKEN_SAFETY_BUFFER_SECS) > Utc::now() {
 return Ok(cached.value.clone());
 }
 }
 }

 let url = format!("{}/authenticate", self.base_url.trim_end_matches('/'));
 let resp = self
 .http
 .post(url)
 .json(&json!({ "username": self.username, "password": self.password }))
 .timeout(std::time::Duration::from_secs(45))
 .send()
 .await
 .map_err(|e| FeedAdapterError::Transport(e.to_string()))?;

 let status = resp.status();
 if !status.is_success() {
 return Err(FeedAdapterError::Api {
 status: status.as_u16(),
 message: "authentication failed".to_string(),
 });
 }

 let body: AuthResponse = resp
 .json()
 .await
 .map_err(|e| FeedAdapterError::Decode(e.to_string()))?;

 let expires_at = Utc::now() + chrono::Duration::seconds(body.expires_in_secs);
 let value = body.token.clone();
 *self.token.write().await = Some(CachedToken { value, expires_at });
 Ok(body.token)
 }
}

#[async_trait]
impl FeedAdapter for NivodaFeedAdapter {
 fn feed_name(&self) -> &'static str {
 "nivoda"
 }

 fn max_page_size(&self) -> i64 {
 50
 }

 fn build_base_query(&self, updated_from: Option<DateTime<Utc>>, updated_to: Option<DateTime<Utc>>) -> FeedQuery {
 FeedQuery {
 min_price_minor: 0,
 max_price_minor: i64::MAX / 2,
 updated_from,
 updated_to,
 }
 }

 async fn count(&self, query: &FeedQuery) -> Result<i64, FeedAdapterError> {
 let token = self.authenticated_token().await?;
 let url = format!("{}/diamonds/count", self.base_url.trim_end_matches('/'));
 let resp = self
 .http
 .post(url)
 .bearer_auth(token)
 .json(&count_request_body(query))
 .timeout(std::time::Duration::from_secs(45))
 .send()
 .await
 .map_err(|e| FeedAdapterError::Transport(e.to_string()))?;

 let status = resp.status();
 if !status.is_success() {
 return Err(FeedAdapterError::Api {
 status: status.as_u16(),
 message: "count request failed".to_string(),
 });
 }
 let body: CountResponse = resp
 .json()
 .await
 .map_err(|e| FeedAdapterError::Decode(e.to_string()))?;
 Ok(body.total_count)
 }

 async fn search(&self, query: &FeedQuery, offset: i64, limit: i64) -> Result<SearchResult, FeedAdapterError> {
 let limit = limit.min(self.max_page_size());
 let token = self.authenticated_token().await?;
 let url = format!("{}/diamonds/search", self.base_url.trim_end_matches('/'));
 let resp = self
 .http
 .post(url)
 .bearer_auth(token)
 .json(&search_request_body(query, offset, limit))
 .timeout(std::time::Duration::from_secs(45))
 .send()
 .await
 .map_err(|e| FeedAdapterError::Transport(e.to_string()))?;

 let status = resp.status();
 if status.as_u16() == 429 {
 return Err(FeedAdapterError::RateLimited("nivoda returned 429".to_string()));
 }
 if !status.is_success() {
 return Err(FeedAdapterError::Api {
 status: status.as_u16(),
 message: "search request failed".to_string(),
 });
 }

 let body: SearchResponse = resp
 .json()
 .await
 .map_err(|e| FeedAdapterError::Decode(e.to_string()))?;

 Ok(SearchResult {
 items: body.items.into_iter().map(|payload| FeedItem { payload }).collect(),
 total_count: body.total_count,
 })
 }

 fn extract_identity(&self, item: &FeedItem) -> Result<ItemIdentity, FeedAdapterError> {
 let supplier_stone_id = item
 .payload
 .get("id")
 .and_then(|v| v.as_str())
 .ok_or_else(|| FeedAdapterError::Decode("missing id".to_string()))?
 .to_string();
 let offer_id = item
 .payload
 .get("offer_id")
 .and_then(|v| v.as_str())
 .unwrap_or(&supplier_stone_id)
 .to_string();
 let source_updated_at = item
 .payload
 .get("updated_at")
 .and_then(|v| v.as_str())
 .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
 .map(|dt| dt.with_timezone(&Utc));

 Ok(ItemIdentity {
 supplier_stone_id,
 offer_id,
 payload: item.payload.clone(),
 source_updated_at,
 })
 }

 fn map_raw_to_canonical(&self, payload: &Value) -> Result<CanonicalFields, FeedAdapterError> {
 let price_minor = payload
 .get("price_minor")
 .and_then(|v| v.as_i64())
 .or_else(|| payload.get("price").and_then(|v| v.as_f64()).map(|p| (p * 100.0).round() as i64))
 .ok_or_else(|| FeedAdapterError::Decode("missing price".to_string()))?;

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

fn count_request_body(query: &FeedQuery) -> Value {
 json!({
 "price_from": query.min_price_minor,
 "price_to": query.max_price_minor,
 "updated_from": query.updated_from,
 "updated_to": query.updated_to,
 })
}

fn search_request_body(query: &FeedQuery, offset: i64, limit: i64) -> Value {
 json!({
 "price_from": query.min_price_minor,
 "price_to": query.max_price_minor,
 "updated_from": query.updated_from,
 "updated_to": query.updated_to,
 "offset": offset,
 "limit": limit,
 "order_by": "created_at_asc",
 })
}

#[derive(Debug, Clone, Deserialize)]
struct AuthResponse {
 token: String,
 expires_in_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct CountResponse {
 total_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchResponse {
 items: Vec<Value>,
 total_count: i64,
}

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn search_request_body_caps_are_shaped_for_offset_pagination() {
 let adapter = NivodaFeedAdapter::new("u".to_string(), "p".to_string());
 let query = adapter.build_base_query(None, None);
 let body = search_request_body(&query, 100, 50);
 assert_eq!(body["offset"], 100);
 assert_eq!(body["limit"], 50);
 }
}
