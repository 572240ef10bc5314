//! Property listings and their visit-slot counters.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pvm_schemas::ListingInfo;
use serde_json::Value;
use sqlx::{PgConnection, PgPool, Row};

/// Slot capacity a brand-new listing gets when the announcement carries none.
pub const DEFAULT_VISIT_SLOTS: i32 = 3;

/// Outcome of reconciling one `info` announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingUpsert {
    /// First sight of this url; row created with the given capacity.
    Inserted { visit_slots: i32 },
    /// Known url; descriptive attributes refreshed, capacity restocked by 1.
    Restocked,
}

/// Insert-or-restock a listing from an `info` broadcast.
///
/// A repeat broadcast for a known url is a restock signal: every descriptive
/// attribute is overwritten with the latest values, but `visit_slots` is
/// incremented by exactly 1 rather than overwritten.
pub async fn upsert_from_info(
    conn: &mut PgConnection,
    info: &ListingInfo,
) -> Result<ListingUpsert> {
    let existing = sqlx::query("select visit_slots from properties where url = $1")
        .bind(&info.url)
        .fetch_optional(&mut *conn)
        .await
        .context("listing existence query failed")?;

    if existing.is_some() {
        sqlx::query(
            r#"
            update properties set
                name        = $1,
                price       = $2,
                currency    = $3,
                bedrooms    = $4,
                bathrooms   = $5,
                m2          = $6,
                location    = $7,
                img         = $8,
                is_project  = $9,
                timestamp   = coalesce($10, now()),
                visit_slots = visit_slots + 1
            where url = $11
            "#,
        )
        .bind(&info.name)
        .bind(info.price)
        .bind(&info.currency)
        .bind(column_int(info.bedrooms))
        .bind(column_int(info.bathrooms))
        .bind(column_int(info.m2))
        .bind(&info.location)
        .bind(&info.img)
        .bind(info.is_project)
        .bind(info.timestamp)
        .bind(&info.url)
        .execute(conn)
        .await
        .context("listing restock update failed")?;
        return Ok(ListingUpsert::Restocked);
    }

    // Out-of-range or negative capacities fall back to the default.
    let visit_slots = info
        .visit_slots
        .and_then(|n| i32::try_from(n).ok())
        .filter(|n| *n >= 0)
        .unwrap_or(DEFAULT_VISIT_SLOTS);
    sqlx::query(
        r#"
        insert into properties
            (name, price, currency, bedrooms, bathrooms, m2, location, img, url,
             is_project, timestamp, visit_slots)
        values
            ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, coalesce($11, now()), $12)
        "#,
    )
    .bind(&info.name)
    .bind(info.price)
    .bind(&info.currency)
    .bind(column_int(info.bedrooms))
    .bind(column_int(info.bathrooms))
    .bind(column_int(info.m2))
    .bind(&info.location)
    .bind(&info.img)
    .bind(&info.url)
    .bind(info.is_project)
    .bind(info.timestamp)
    .bind(visit_slots)
    .execute(conn)
    .await
    .context("listing insert failed")?;

    Ok(ListingUpsert::Inserted { visit_slots })
}

/// Narrow a coerced wire integer to a column value; out-of-range is absent,
/// same as a field with no embeddable integer.
fn column_int(n: Option<i64>) -> Option<i32> {
    n.and_then(|n| i32::try_from(n).ok())
}

pub async fn fetch_slots(conn: &mut PgConnection, url: &str) -> Result<Option<i32>> {
    let row = sqlx::query("select visit_slots from properties where url = $1")
        .bind(url)
        .fetch_optional(conn)
        .await
        .context("fetch_slots failed")?;
    row.map(|r| r.try_get("visit_slots").context("visit_slots column"))
        .transpose()
}

/// Latest known price for a url (newest broadcast wins).
pub async fn latest_price(conn: &mut PgConnection, url: &str) -> Result<Option<f64>> {
    let row = sqlx::query(
        "select price from properties where url = $1 order by timestamp desc limit 1",
    )
    .bind(url)
    .fetch_optional(conn)
    .await
    .context("latest_price failed")?;
    Ok(row.and_then(|r| r.try_get::<Option<f64>, _>("price").ok().flatten()))
}

/// Consume one visit slot, floored at 0.
pub async fn consume_slot(conn: &mut PgConnection, url: &str) -> Result<()> {
    sqlx::query(
        "update properties set visit_slots = greatest(visit_slots - 1, 0) where url = $1",
    )
    .bind(url)
    .execute(conn)
    .await
    .context("consume_slot failed")?;
    Ok(())
}

/// Give back one visit slot (rejection, error, or compensation).
pub async fn restore_slot(conn: &mut PgConnection, url: &str) -> Result<()> {
    sqlx::query("update properties set visit_slots = visit_slots + 1 where url = $1")
        .bind(url)
        .execute(conn)
        .await
        .context("restore_slot failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Read surface for the API layer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ListingRow {
    pub id: i64,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub currency: String,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub m2: Option<i32>,
    pub location: Option<Value>,
    pub img: Option<String>,
    pub url: String,
    pub is_project: bool,
    pub timestamp: DateTime<Utc>,
    pub visit_slots: i32,
}

fn listing_from_row(row: &sqlx::postgres::PgRow) -> Result<ListingRow> {
    Ok(ListingRow {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        price: row.try_get("price")?,
        currency: row.try_get("currency")?,
        bedrooms: row.try_get("bedrooms")?,
        bathrooms: row.try_get("bathrooms")?,
        m2: row.try_get("m2")?,
        location: row.try_get("location")?,
        img: row.try_get("img")?,
        url: row.try_get("url")?,
        is_project: row.try_get("is_project")?,
        timestamp: row.try_get("timestamp")?,
        visit_slots: row.try_get("visit_slots")?,
    })
}

pub async fn fetch_listing(pool: &PgPool, url: &str) -> Result<Option<ListingRow>> {
    let row = sqlx::query("select * from properties where url = $1")
        .bind(url)
        .fetch_optional(pool)
        .await
        .context("fetch_listing failed")?;
    row.as_ref().map(listing_from_row).transpose()
}

pub async fn list_listings(pool: &PgPool, limit: i64) -> Result<Vec<ListingRow>> {
    let rows = sqlx::query("select * from properties order by timestamp desc limit $1")
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("list_listings failed")?;
    rows.iter().map(listing_from_row).collect()
}
