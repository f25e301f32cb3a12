//! `dataset_versions` access (Response Cache invalidation).
//!
//! The version counter is bumped once per Consolidator run, inside the same
//! transaction as the soft-delete pass, so readers either see the whole
//! run's effects or none of them.

use anyhow::{Context, Result};
use ingest_schemas::DatasetVersion;
use sqlx::{PgPool, Postgres, Transaction};

pub async fn get_version(pool: &PgPool, feed: &str) -> Result<i64> {
 let row = sqlx::query_as::<_, DatasetVersion>("select * from dataset_versions where feed = $1")
 .bind(feed)
 .fetch_optional(pool)
 .await
 .context("get_version failed")?;
 Ok(row.map(|r| r.version).unwrap_or(0))
}

pub async fn get_all_versions(pool: &PgPool) -> Result<Vec<DatasetVersion>> {
 let rows = sqlx::query_as::<_, DatasetVersion>("select * from dataset_versions order by feed")
 .fetch_all(pool)
 .await
 .context("get_all_versions failed")?;
 Ok(rows)
}

/// Atomically increment the feed's version, creating the row on first use.
pub async fn bump_version(tx: &mut Transaction<'_, Postgres>, feed: &str) -> Result<i64> {
 let (version): (i64) = sqlx::query_as(r#"
 insert into dataset_versions (feed, version, updated_at)
 values ($1, 1, now)
 on conflict (feed) do update set
 version = dataset_versions.version + 1,
 updated_at = now
 returning version
 "#)
 .bind(feed)
 .fetch_one(&mut **tx)
 .await
 .context("bump_version failed")?;
 Ok(version)
}
