//! Tagged queue message bodies (EXTERNAL INTERFACES DESIGN
//! NOTES "tagged messages map to sum types with exhaustive matching").

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A `work-items` message: one partition, resumable from `offset`.
///
/// `message_id` is the stable dedup token
/// `run_id:partition_id:offset_start` (GLOSSARY).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemMsg {
 pub message_id: String,
 pub run_id: Uuid,
 pub partition_id: i32,
 pub offset: i64,
 pub limit: i32,
 /// Opaque replay payload carried alongside the message so a worker can
 /// resume without a DB round-trip if the partition row is temporarily
 /// unavailable.
 pub work_item_payload: Value,
}

impl WorkItemMsg {
 pub fn message_id_for(run_id: Uuid, partition_id: i32, offset: i64) -> String {
 format!("{run_id}:{partition_id}:{offset}")
 }
}

/// A `work-done` message emitted by a Worker on terminal partition outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkDoneMsg {
 pub run_id: Uuid,
 pub partition_id: i32,
 pub outcome: WorkDoneOutcome,
 pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkDoneOutcome {
 Success,
 Failed,
}

/// A `consolidate` message, published by the Scheduler or Monitor to
/// trigger a Consolidator pass for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidateMsg {
 pub run_id: Uuid,
 pub feed: String,
}
