//! `raw_{feed}` access (Worker writes Consolidator reads).
//!
//! The reference deployment has one raw table (`raw_demo`); production
//! installs get one `raw_<feed>` table per onboarded feed, all sharing this
//! shape, so every function here takes `feed` and interpolates the table
//! name. Feed names are validated against a fixed allowlist of known
//! identifiers before interpolation — never passed through from unchecked
//! external input.

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use ingest_schemas::RawRow;
use serde_json::Value;
use sqlx::PgPool;

const KNOWN_FEEDS: &[&str] = &["demo"];

fn raw_table(feed: &str) -> Result<String> {
 if !KNOWN_FEEDS.contains(&feed) {
 bail!("unknown feed `{feed}`, expected one of {KNOWN_FEEDS:?}");
 }
 Ok(format!("raw_{feed}"))
}

#[derive(Debug, Clone)]
pub struct RawRowUpsert {
 pub supplier_stone_id: String,
 pub offer_id: String,
 pub payload: Value,
 pub source_updated_at: chrono::DateTime<Utc>,
}

/// Insert-or-overwrite a raw row, resetting `consolidation_status` to
/// `pending` so the Consolidator picks up the new payload even if the
/// previous copy of this stone was already `done`.
pub async fn upsert_raw_row(pool: &PgPool, feed: &str, row: &RawRowUpsert) -> Result<()> {
 let table = raw_table(feed)?;
 let sql = format!(r#"
 insert into {table} (supplier_stone_id, offer_id, payload, source_updated_at, updated_at)
 values ($1, $2, $3, $4, now)
 on conflict (supplier_stone_id) do update set
 offer_id = excluded.offer_id,
 payload = excluded.payload,
 source_updated_at = excluded.source_updated_at,
 consolidation_status = 'pending',
 claim_expiry = null,
 updated_at = now
 "#);
 sqlx::query(&sql)
 .bind(&row.supplier_stone_id)
 .bind(&row.offer_id)
 .bind(&row.payload)
 .bind(row.source_updated_at)
 .execute(pool)
 .await
 .context("upsert_raw_row failed")?;
 Ok(())
}

/// Claim up to `batch_size` pending rows for consolidation. The UPDATE...
/// RETURNING makes the read-and-mark atomic so two consolidator replicas
/// never pick up the same row.
pub async fn claim_batch(pool: &PgPool, feed: &str, batch_size: i64, lease: Duration) -> Result<Vec<RawRow>> {
 let table = raw_table(feed)?;
 let expiry = Utc::now() + lease;
 let sql = format!(r#"
 with claimed as (select supplier_stone_id
 from {table}
 where consolidation_status = 'pending'
 order by updated_at
 limit $1
 for update skip locked)
 update {table} t
 set consolidation_status = 'claimed', claim_expiry = $2
 from claimed
 where t.supplier_stone_id = claimed.supplier_stone_id
 returning t.*
 "#);
 let rows = sqlx::query_as::<_, RawRow>(&sql)
 .bind(batch_size)
 .bind(expiry)
 .fetch_all(pool)
 .await
 .context("claim_batch failed")?;
 Ok(rows)
}

pub async fn mark_done(pool: &PgPool, feed: &str, supplier_stone_ids: &[String]) -> Result<()> {
 if supplier_stone_ids.is_empty() {
 return Ok(());
 }
 let table = raw_table(feed)?;
 let sql = format!(r#"
 update {table}
 set consolidation_status = 'done', claim_expiry = null
 where supplier_stone_id = any($1)
 "#);
 sqlx::query(&sql)
 .bind(supplier_stone_ids)
 .execute(pool)
 .await
 .context("mark_done failed")?;
 Ok(())
}

/// Claims whose lease has expired revert to `pending` so a crashed
/// consolidator doesn't strand rows forever (Monitor sweep).
pub async fn sweep_expired_claims(pool: &PgPool, feed: &str) -> Result<u64> {
 let table = raw_table(feed)?;
 let sql = format!(r#"
 update {table}
 set consolidation_status = 'pending', claim_expiry = null
 where consolidation_status = 'claimed' and claim_expiry < now
 "#);
 let result = sqlx::query(&sql)
 .execute(pool)
 .await
 .context("sweep_expired_claims failed")?;
 Ok(result.rows_affected())
}

/// All supplier_stone_ids currently `done` for a feed, used by the
/// Consolidator to detect rows absent from the latest run (soft-delete
/// candidates).
pub async fn all_known_stone_ids(pool: &PgPool, feed: &str) -> Result<Vec<String>> {
 let table = raw_table(feed)?;
 let sql = format!("select supplier_stone_id from {table}");
 let rows: Vec<(String)> = sqlx::query_as(&sql)
 .fetch_all(pool)
 .await
 .context("all_known_stone_ids failed")?;
 Ok(rows.into_iter().map(|(id)| id).collect())
}
