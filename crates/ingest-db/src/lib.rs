// crates/ingest-db/src/lib.rs
//! Postgres access layer for the ingestion pipeline (relational
//! schema). Every row-level lock or CAS transition named in //! lives in exactly one function here so callers never hand-roll SQL.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub mod diamonds;
pub mod partitions;
pub mod rate_limit;
pub mod raw_rows;
pub mod runs;
pub mod versions;

pub use diamonds::*;
pub use partitions::*;
pub use rate_limit::*;
pub use raw_rows::*;
pub use runs::*;
pub use versions::*;

pub const ENV_DB_URL: &str = "INGEST_DATABASE_URL";

/// Connect to Postgres using INGEST_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
 let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
 connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
 let pool = PgPoolOptions::new()
 .max_connections(10)
 .connect(url)
 .await
 .context("failed to connect to Postgres")?;
 Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
 sqlx::migrate!("./migrations")
 .run(pool)
 .await
 .context("db migrate failed")?;
 Ok(())
}

/// Test helper: connect using INGEST_DATABASE_URL, ensure migrations applied.
pub async fn testkit_db_pool() -> Result<PgPool> {
 let pool = connect_from_env.await?;
 migrate(&pool).await?;
 Ok(pool)
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
 let (one): (i32) = sqlx::query_as::<_, (i32)>("select 1")
 .fetch_one(pool)
 .await
 .context("status connectivity query failed")?;
 let ok = one == 1;

 let (exists): (bool) = sqlx::query_as::<_, (bool)>(r#"
 select exists (select 1
 from information_schema.tables
 where table_schema='public' and table_name='run_metadata')
 "#)
 .fetch_one(pool)
 .await
 .context("status table-exists query failed")?;

 Ok(DbStatus {
 ok,
 has_run_metadata_table: exists,
 })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
 pub ok: bool,
 pub has_run_metadata_table: bool,
}
