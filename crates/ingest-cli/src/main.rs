use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ingest")]
#[command(about = "Diamond inventory ingestion CLI", long_about = None)]
struct Cli {
 #[command(subcommand)]
 cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
 /// Database commands
 Db {
 #[command(subcommand)]
 cmd: DbCmd,
 },

 /// Compute layered config hash + print canonical JSON
 ConfigHash {
 /// Paths in merge order (base -> per-feed -> per-environment)
 #[arg(required = true)]
 paths: Vec<String>,
 },

 /// Scheduler commands
 Scheduler {
 #[command(subcommand)]
 cmd: SchedulerCmd,
 },

 /// Consolidator commands
 Consolidate {
 #[command(subcommand)]
 cmd: ConsolidateCmd,
 },

 /// Monitor commands
 Monitor {
 #[command(subcommand)]
 cmd: MonitorCmd,
 },

 /// Response cache commands
 Cache {
 #[command(subcommand)]
 cmd: CacheCmd,
 },
}

#[derive(Subcommand)]
enum DbCmd {
 Status,
 Migrate,
}

#[derive(Subcommand)]
enum SchedulerCmd {
 /// Create a run for `feed` and enqueue one work item per partition.
 Run {
 #[arg(long)]
 feed: String,
 },
}

#[derive(Subcommand)]
enum ConsolidateCmd {
 /// Drain pending raw rows for `feed` into the canonical table.
 Run {
 #[arg(long)]
 run_id: uuid::Uuid,
 #[arg(long)]
 feed: String,
 },
}

#[derive(Subcommand)]
enum MonitorCmd {
 /// Run one stall-detection + retry sweep for `feed`.
 Tick {
 #[arg(long)]
 feed: String,
 },
}

#[derive(Subcommand)]
enum CacheCmd {
 /// Print current composite dataset versions (what a fresh cache would gate on).
 Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
 let _ = dotenvy::from_filename(".env.local");
 tracing_subscriber::fmt
 .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
 .init();

 let cli = Cli::parse();

 match cli.cmd {
 Commands::Db { cmd } => {
 let pool = ingest_db::connect_from_env().await?;
 match cmd {
 DbCmd::Status => {
 let s = ingest_db::status(&pool).await?;
 println!("db_ok={} has_run_metadata_table={}", s.ok(), s.has_run_metadata_table);
 }
 DbCmd::Migrate => {
 ingest_db::migrate(&pool).await?;
 println!("migrations_applied=true");
 }
 }
 }

 Commands::ConfigHash { paths } => {
 let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
 let loaded = ingest_config::load_layered_yaml(&path_refs)?;
 println!("config_hash={}", loaded.config_hash);
 println!("{}", loaded.canonical_json);
 }

 Commands::Scheduler { cmd } => match cmd {
 SchedulerCmd::Run { feed } => {
 let pool = ingest_db::connect_from_env().await?;
 let watermark_dir = watermark_dir_from_env;
 let watermark_store = ingest_blob::FsWatermarkStore::new(watermark_dir);
 let adapter = resolve_adapter(&feed)?;
 let queue = ingest_queue::InMemoryWorkQueue::new();

 let outcome = ingest_scheduler::run_once(&pool,
 &watermark_store,
 adapter,
 &queue,
 &ingest_scheduler::SchedulerConfig::default())
 .await?;

 match outcome {
 ingest_scheduler::RunOutcome::CompletedImmediately { run_id } => {
 println!("run_id={run_id}");
 println!("outcome=completed_immediately");
 }
 ingest_scheduler::RunOutcome::Enqueued { run_id, partition_count } => {
 println!("run_id={run_id}");
 println!("outcome=enqueued");
 println!("partition_count={partition_count}");
 }
 }
 }
 },

 Commands::Consolidate { cmd } => match cmd {
 ConsolidateCmd::Run { run_id, feed } => {
 let pool = ingest_db::connect_from_env().await?;
 let watermark_dir = watermark_dir_from_env;
 let watermark_store = ingest_blob::FsWatermarkStore::new(watermark_dir);
 let adapter = resolve_adapter(&feed)?;

 let msg = ingest_schemas::ConsolidateMsg { run_id, feed };
 let report = ingest_consolidator::consolidate(&pool,
 adapter,
 &watermark_store,
 &msg,
 &ingest_consolidator::ConsolidatorConfig::default())
 .await?;

 println!("rows_consolidated={}", report.rows_consolidated);
 println!("soft_deleted={}", report.soft_deleted);
 println!("new_version={:?}", report.new_version);
 }
 },

 Commands::Monitor { cmd } => match cmd {
 MonitorCmd::Tick { feed } => {
 let pool = ingest_db::connect_from_env().await?;
 let queue = ingest_queue::InMemoryWorkQueue::new();

 let report = ingest_monitor::run_once(&pool, &feed, &queue, &ingest_monitor::MonitorConfig::default()).await?;

 println!("stalled={}", report.stalled);
 println!("retried={}", report.retried);
 println!("claims_swept={}", report.claims_swept);
 }
 },

 Commands::Cache { cmd } => match cmd {
 CacheCmd::Stats => {
 let pool = ingest_db::connect_from_env().await?;
 let versions = ingest_db::get_all_versions(&pool).await?;
 let composite = ingest_cache::build_composite_version(&versions);
 println!("composite_version={composite}");
 for v in versions {
 println!(" {}={}", v.feed, v.version);
 }
 }
 },
 }

 Ok(())
}

fn watermark_dir_from_env() -> String {
 std::env::var("INGEST_WATERMARK_DIR").unwrap_or_else(|_| "./watermarks".to_string())
}

/// A CLI invocation only ever has a single feed adapter in scope; a daemon
/// keeps the full `FeedRegistry`, but `ingest` is meant for one-off/ops use.
fn resolve_adapter(feed: &str) -> Result<Arc<dyn ingest_feed::FeedAdapter>> {
 match feed {
 "demo" => Ok(Arc::new(ingest_feed::DemoFeedAdapter::default())),
 other => anyhow::bail!("unknown feed adapter {other}"),
 }
}
