//! ingest-queue
//!
//! The three logical queues (`work-items`, `work-done`, `consolidate`)
//! behind one small at-least-once delivery trait. Messages carry a stable
//! `message_id` for server-side deduplication: claim-with-visibility-timeout,
//! complete-or-abandon, never a second live delivery for the same id
//! while one is in flight.
//!
//! `InMemoryWorkQueue` is the reference implementation: fine for a single
//! process or tests; a production deployment swaps this for a hosted
//! broker behind the same trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ingest_schemas::{IngestError, IngestResult};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::Notify;

/// A queued message: an opaque JSON body plus the dedup key.
#[derive(Debug, Clone)]
pub struct QueueMessage {
 pub message_id: String,
 pub body: serde_json::Value,
}

/// A message handed out by `receive`, carrying the delivery handle a
/// caller needs to `complete` or `abandon` it.
#[derive(Debug, Clone)]
pub struct Delivery {
 pub message: QueueMessage,
 pub receipt: String,
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
 /// Enqueue a message. A message whose `message_id` is already queued
 /// or in flight is a silent no-op (dedup-makes-retries-idempotent).
 async fn send(&self, message: QueueMessage) -> IngestResult<()>;

 /// Receive one message not currently in flight, with a visibility
 /// timeout after which it becomes eligible for redelivery if not
 /// completed or abandoned. Returns `None` if nothing is available
 /// within `poll_wait`.
 async fn receive(&self, visibility_timeout: chrono::Duration, poll_wait: chrono::Duration) -> Option<Delivery>;

 /// Acknowledge successful processing; the message is gone for good.
 async fn complete(&self, receipt: &str) -> IngestResult<()>;

 /// Return the message to the queue immediately for redelivery
 /// ("On retryable error: abandon the current message").
 async fn abandon(&self, receipt: &str) -> IngestResult<()>;

 /// Number of messages neither in flight nor completed.
 async fn pending_count(&self) -> usize;
}

struct InFlight {
 message: QueueMessage,
 visible_at: DateTime<Utc>,
}

struct Inner {
 ready: VecDeque<String>,
 messages: HashMap<String, QueueMessage>,
 in_flight: HashMap<String, InFlight>,
 known_ids: std::collections::HashSet<String>,
}

pub struct InMemoryWorkQueue {
 inner: Mutex<Inner>,
 notify: Notify,
}

impl Default for InMemoryWorkQueue {
 fn default() -> Self {
 Self::new()
 }
}

impl InMemoryWorkQueue {
 pub fn new() -> Self {
 Self {
 inner: Mutex::new(Inner {
 ready: VecDeque::new(),
 messages: HashMap::new(),
 in_flight: HashMap::new(),
 known_ids: std::collections::HashSet::new(),
 }),
 notify: Notify::new(),
 }
 }

 /// Moves any in-flight message whose visibility timeout has elapsed
 /// back onto the ready queue. Called opportunistically from
 /// `receive` so no separate sweeper task is required for this
 /// in-process implementation.
 fn requeue_expired(inner: &mut Inner) {
 let now = Utc::now();
 let expired: Vec<String> = inner
 .in_flight
 .iter()
 .filter(|(_, f)| f.visible_at <= now)
 .map(|(receipt, _)| receipt.clone())
 .collect();
 for receipt in expired {
 if let Some(flight) = inner.in_flight.remove(&receipt) {
 inner.ready.push_back(flight.message.message_id.clone());
 }
 }
 }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
 async fn send(&self, message: QueueMessage) -> IngestResult<()> {
 let mut inner = self.inner.lock().unwrap();
 if inner.known_ids.contains(&message.message_id) {
 return Ok(());
 }
 inner.known_ids.insert(message.message_id.clone());
 inner.ready.push_back(message.message_id.clone());
 inner.messages.insert(message.message_id.clone(), message);
 drop(inner);
 self.notify.notify_waiters();
 Ok(())
 }

 async fn receive(&self, visibility_timeout: chrono::Duration, poll_wait: chrono::Duration) -> Option<Delivery> {
 let deadline = tokio::time::Instant::now() + poll_wait.to_std().unwrap_or_default();
 loop {
 {
 let mut inner = self.inner.lock().unwrap();
 Self::requeue_expired(&mut inner);
 if let Some(message_id) = inner.ready.pop_front() {
 let message = inner.messages.get(&message_id).cloned()?;
 let receipt = uuid::Uuid::new_v4().to_string();
 inner.in_flight.insert(receipt.clone(),
 InFlight {
 message: message.clone(),
 visible_at: Utc::now() + visibility_timeout,
 });
 return Some(Delivery { message, receipt });
 }
 }

 if tokio::time::Instant::now() >= deadline {
 return None;
 }
 let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
 let _ = tokio::time::timeout(remaining, self.notify.notified()).await;
 }
 }

 async fn complete(&self, receipt: &str) -> IngestResult<()> {
 let mut inner = self.inner.lock().unwrap();
 if let Some(flight) = inner.in_flight.remove(receipt) {
 inner.messages.remove(&flight.message.message_id);
 }
 Ok(())
 }

 async fn abandon(&self, receipt: &str) -> IngestResult<()> {
 let mut inner = self.inner.lock().unwrap();
 let flight = inner
 .in_flight
 .remove(receipt)
 .ok_or_else(|| IngestError::NotFound(format!("no in-flight message for receipt {receipt}")))?;
 inner.ready.push_back(flight.message.message_id);
 drop(inner);
 self.notify.notify_waiters();
 Ok(())
 }

 async fn pending_count(&self) -> usize {
 let inner = self.inner.lock().unwrap();
 inner.ready.len() + inner.in_flight.len()
 }
}

#[cfg(test)]
mod tests {
 use super::*;
 use serde_json::json;

 #[tokio::test]
 async fn duplicate_message_id_is_deduplicated() {
 let queue = InMemoryWorkQueue::new();
 let msg = QueueMessage {
 message_id: "run-1:0:0".to_string(),
 body: json!({"type": "WORK_ITEM"}),
 };
 queue.send(msg.clone()).await.unwrap();
 queue.send(msg).await.unwrap();
 assert_eq!(queue.pending_count().await, 1);
 }

 #[tokio::test]
 async fn receive_then_complete_removes_message() {
 let queue = InMemoryWorkQueue::new();
 queue
 .send(QueueMessage {
 message_id: "run-1:0:0".to_string(),
 body: json!({}),
 })
 .await
 .unwrap();

 let delivery = queue
 .receive(chrono::Duration::seconds(30), chrono::Duration::milliseconds(100))
 .await
 .unwrap();
 queue.complete(&delivery.receipt).await.unwrap();
 assert_eq!(queue.pending_count().await, 0);
 }

 #[tokio::test]
 async fn abandon_makes_message_immediately_redeliverable() {
 let queue = InMemoryWorkQueue::new();
 queue
 .send(QueueMessage {
 message_id: "run-1:0:0".to_string(),
 body: json!({}),
 })
 .await
 .unwrap();

 let first = queue
 .receive(chrono::Duration::seconds(30), chrono::Duration::milliseconds(100))
 .await
 .unwrap();
 queue.abandon(&first.receipt).await.unwrap();

 let second = queue
 .receive(chrono::Duration::seconds(30), chrono::Duration::milliseconds(100))
 .await
 .unwrap();
 assert_eq!(second.message.message_id, "run-1:0:0");
 }

 #[tokio::test]
 async fn expired_visibility_timeout_requeues_for_redelivery() {
 let queue = InMemoryWorkQueue::new();
 queue
 .send(QueueMessage {
 message_id: "run-1:0:0".to_string(),
 body: json!({}),
 })
 .await
 .unwrap();

 let _first = queue
 .receive(chrono::Duration::milliseconds(10), chrono::Duration::milliseconds(100))
 .await
 .unwrap();

 tokio::time::sleep(std::time::Duration::from_millis(30)).await;

 let second = queue
 .receive(chrono::Duration::seconds(30), chrono::Duration::milliseconds(200))
 .await
 .unwrap();
 assert_eq!(second.message.message_id, "run-1:0:0");
 }

 #[tokio::test]
 async fn receive_returns_none_after_poll_wait_when_empty() {
 let queue = InMemoryWorkQueue::new();
 let result = queue
 .receive(chrono::Duration::seconds(30), chrono::Duration::milliseconds(50))
 .await;
 assert!(result.is_none());
 }
}
