//! Which config pointers a given run type reads, so the Scheduler can
//! validate coverage before a run starts rather than fail mid-partition.

use ingest_schemas::RunType;

pub fn consumed_pointers(run_type: RunType) -> &'static [&'static str] {
 match run_type {
 RunType::Full => FULL,
 RunType::Incremental => INCREMENTAL,
 }
}

static FULL: &[&str] = &[
 "/db/url_env",
 "/feeds",
 "/heatmap",
 "/rate_limit",
];

static INCREMENTAL: &[&str] = &[
 "/db/url_env",
 "/feeds",
 "/heatmap",
 "/rate_limit",
 "/scheduler/safety_buffer_secs",
];
