//! Cross-cutting error taxonomy (ERROR HANDLING DESIGN).
//!
//! Every crate boundary (feed adapter, rate limiter, queue, worker,
//! consolidator) classifies its failures into one of these kinds so the
//! caller can make a single retry/abandon/terminate decision, the same
//! shape as the `ErrorKind` (`Retryable` / `NonRetryable` / `Cancelled` /
//! `Shutdown`) enum used by job-queue style systems in the wider pack.

use std::fmt;

pub type IngestResult<T> = Result<T, IngestError>;

/// A kind-tagged error that downstream callers can dispatch on without
/// string matching.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
 /// Network failure, 5xx, 429, or a lock conflict. Callers retry with
 /// backoff.
 #[error("transient: {0}")]
 Transient(String),

 /// Schema/type coercion failure. Surfaced to API callers as 400.
 #[error("validation: {0}")]
 Validation(String),

 /// The rate limiter could not acquire a token within `max_wait_ms`.
 /// Treated as transient by callers but distinguished so it can be
 /// logged and abandoned without a stack of retries of its own.
 #[error("rate limit exceeded: {0}")]
 RateLimitExceeded(String),

 /// Auth misconfiguration, missing env var, or other condition that
 /// cannot be retried away. Callers terminate the process.
 #[error("fatal: {0}")]
 Fatal(String),

 /// Heartbeat lapse detected by the Monitor; the owning entity
 /// (partition, job) has been transitioned to failed.
 #[error("stalled: {0}")]
 Stalled(String),

 /// Requested entity does not exist. Surfaced to API callers as 404.
 #[error("not found: {0}")]
 NotFound(String),

 /// Conflicting state transition (e.g. CAS lost the race). Surfaced to
 /// API callers as 409.
 #[error("conflict: {0}")]
 Conflict(String),
}

impl IngestError {
 /// Whether a caller should retry this error (with backoff) rather than
 /// surface it to an operator or terminate.
 pub fn is_retryable(&self) -> bool {
 matches!(self,
 IngestError::Transient(_) | IngestError::RateLimitExceeded(_))
 }

 /// Whether this error should terminate the owning process rather than
 /// be absorbed.
 pub fn is_fatal(&self) -> bool {
 matches!(self, IngestError::Fatal(_))
 }
}

/// User-visible error body : internal reasons are logged but
/// never echoed on 500.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ApiError {
 pub code: String,
 pub message: String,
 pub details: Option<serde_json::Value>,
}

impl fmt::Display for ApiError {
 fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
 write!(f, "{}: {}", self.code, self.message)
 }
}

impl From<&IngestError> for ApiError {
 fn from(e: &IngestError) -> Self {
 match e {
 IngestError::Validation(msg) => ApiError {
 code: "validation_error".to_string(),
 message: msg.clone(),
 details: None,
 },
 IngestError::NotFound(msg) => ApiError {
 code: "not_found".to_string(),
 message: msg.clone(),
 details: None,
 },
 IngestError::Conflict(msg) => ApiError {
 code: "conflict".to_string(),
 message: msg.clone(),
 details: None,
 },
 _ => ApiError {
 code: "internal_error".to_string(),
 message: "Internal server error".to_string(),
 details: None,
 },
 }
 }
}
