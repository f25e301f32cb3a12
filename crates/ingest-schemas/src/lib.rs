//! ingest-schemas
//!
//! Shared wire and row types for the diamond feed ingestion pipeline:
//! Scheduler -> Worker -> Consolidator, plus the types the Monitor and
//! Response Cache operate on. No IO lives here; this crate is pure data
//! plus the cross-cutting error taxonomy every other crate classifies
//! errors into.

pub mod error;
pub mod messages;
pub mod types;

pub use error::{IngestError, IngestResult};
pub use messages::{ConsolidateMsg, WorkDoneMsg, WorkDoneOutcome, WorkItemMsg};
pub use types::{
 CanonicalDiamond, ConsolidationStatus, DatasetVersion, DiamondStatus, MonitorJob,
 MonitorJobKind, MonitorJobStatus, Partition, PartitionStatus, RateLimitRow, RawRow, Run,
 RunType, Watermark,
};
