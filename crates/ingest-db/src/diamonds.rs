//! `diamonds` canonical table access ("CanonicalDiamond"
//! Consolidator soft-delete invariant).

use anyhow::{Context, Result};
use ingest_schemas::CanonicalDiamond;
use sqlx::{PgPool, Postgres, Transaction};

#[derive(Debug, Clone)]
pub struct DiamondUpsert {
 pub feed: String,
 pub supplier_stone_id: String,
 pub offer_id: String,
 pub shape: Option<String>,
 pub carat: Option<f64>,
 pub color: Option<String>,
 pub clarity: Option<String>,
 pub cut: Option<String>,
 pub price_minor: i64,
 pub availability: Option<String>,
 pub source_updated_at: chrono::DateTime<chrono::Utc>,
}

/// Insert-or-update a canonical diamond. On conflict, null attributes in
/// the new payload never overwrite a previously known non-null value
/// (carry-forward invariant: a supplier that temporarily omits
/// a field should not erase what we already know). A row that was
/// previously soft-deleted is revived to `active`.
pub async fn upsert_diamond(tx: &mut Transaction<'_, Postgres>, d: &DiamondUpsert) -> Result<()> {
 sqlx::query(r#"
 insert into diamonds (feed, supplier_stone_id, offer_id, shape, carat, color, clarity, cut,
 price_minor, availability, status, source_updated_at, updated_at, deleted_at) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'active', $11, now, null)
 on conflict (feed, supplier_stone_id) where status = 'active' do update set
 offer_id = excluded.offer_id,
 shape = coalesce(excluded.shape, diamonds.shape),
 carat = coalesce(excluded.carat, diamonds.carat),
 color = coalesce(excluded.color, diamonds.color),
 clarity = coalesce(excluded.clarity, diamonds.clarity),
 cut = coalesce(excluded.cut, diamonds.cut),
 price_minor = excluded.price_minor,
 availability = coalesce(excluded.availability, diamonds.availability),
 source_updated_at = excluded.source_updated_at,
 updated_at = now
 "#)
 .bind(&d.feed)
 .bind(&d.supplier_stone_id)
 .bind(&d.offer_id)
 .bind(&d.shape)
 .bind(d.carat)
 .bind(&d.color)
 .bind(&d.clarity)
 .bind(&d.cut)
 .bind(d.price_minor)
 .bind(&d.availability)
 .bind(d.source_updated_at)
 .execute(&mut **tx)
 .await
 .context("upsert_diamond failed")?;
 Ok(())
}

/// Soft-delete active diamonds for `feed` whose `supplier_stone_id` is not
/// in `still_present`: the supplier no longer lists them. Never a hard
/// delete — rows must survive for audit/history.
pub async fn soft_delete_absent(tx: &mut Transaction<'_, Postgres>,
 feed: &str,
 still_present: &[String]) -> Result<u64> {
 let result = sqlx::query(r#"
 update diamonds
 set status = 'deleted', deleted_at = now
 where feed = $1 and status = 'active' and not (supplier_stone_id = any($2))
 "#)
 .bind(feed)
 .bind(still_present)
 .execute(&mut **tx)
 .await
 .context("soft_delete_absent failed")?;
 Ok(result.rows_affected())
}

pub async fn get_active_diamond(pool: &PgPool,
 feed: &str,
 supplier_stone_id: &str) -> Result<Option<CanonicalDiamond>> {
 let row = sqlx::query_as::<_, CanonicalDiamond>(r#"
 select * from diamonds
 where feed = $1 and supplier_stone_id = $2 and status = 'active'
 "#)
 .bind(feed)
 .bind(supplier_stone_id)
 .fetch_optional(pool)
 .await
 .context("get_active_diamond failed")?;
 Ok(row)
}

#[derive(Debug, Clone, Default)]
pub struct DiamondSearch {
 pub feed: Option<String>,
 pub shape: Option<String>,
 pub min_price_minor: Option<i64>,
 pub max_price_minor: Option<i64>,
 pub limit: i64,
 pub offset: i64,
}

pub async fn search_active_diamonds(pool: &PgPool, params: &DiamondSearch) -> Result<Vec<CanonicalDiamond>> {
 let rows = sqlx::query_as::<_, CanonicalDiamond>(r#"
 select * from diamonds
 where status = 'active'
 and ($1::text is null or feed = $1)
 and ($2::text is null or shape = $2)
 and ($3::bigint is null or price_minor >= $3)
 and ($4::bigint is null or price_minor <= $4)
 order by price_minor
 limit $5 offset $6
 "#)
 .bind(&params.feed)
 .bind(&params.shape)
 .bind(params.min_price_minor)
 .bind(params.max_price_minor)
 .bind(params.limit)
 .bind(params.offset)
 .fetch_all(pool)
 .await
 .context("search_active_diamonds failed")?;
 Ok(rows)
}
