//! Auction exchange records.
//!
//! One negotiation shares an `auction_id` across several rows: the offer,
//! foreign proposals against it, and the terminal decision. Rows are created
//! once; only `status` (and `updated_at`) mutate afterwards.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pvm_schemas::{AuctionMessage, AuctionStatus};
use sqlx::{PgConnection, PgPool, Row};

#[derive(Debug, Clone)]
pub struct AuctionRow {
    pub auction_id: String,
    pub proposal_id: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub quantity: i32,
    pub group_id: String,
    pub operation: String,
    pub origin_group_id: String,
    pub status: String,
}

fn auction_from_row(row: &sqlx::postgres::PgRow) -> Result<AuctionRow> {
    Ok(AuctionRow {
        auction_id: row.try_get("auction_id")?,
        proposal_id: row.try_get("proposal_id")?,
        url: row.try_get("url")?,
        timestamp: row.try_get("timestamp")?,
        quantity: row.try_get("quantity")?,
        group_id: row.try_get("group_id")?,
        operation: row.try_get("operation")?,
        origin_group_id: row.try_get("origin_group_id")?,
        status: row.try_get("status")?,
    })
}

/// Does an offer row for this auction already exist?
pub async fn offer_exists(conn: &mut PgConnection, auction_id: &str) -> Result<bool> {
    let row = sqlx::query(
        "select 1 as one from auctions where auction_id = $1 and operation = 'offer'",
    )
    .bind(auction_id)
    .fetch_optional(conn)
    .await
    .context("offer_exists failed")?;
    Ok(row.is_some())
}

/// Redelivered offer: refresh status and timestamp only, never duplicate.
pub async fn refresh_offer(conn: &mut PgConnection, auction_id: &str) -> Result<()> {
    sqlx::query(
        r#"
        update auctions
        set status = $1, updated_at = now()
        where auction_id = $2 and operation = 'offer'
        "#,
    )
    .bind(AuctionStatus::Active.as_str())
    .bind(auction_id)
    .execute(conn)
    .await
    .context("refresh_offer failed")?;
    Ok(())
}

/// Persist one negotiation row as announced by `origin_group_id`.
pub async fn insert_record(
    conn: &mut PgConnection,
    msg: &AuctionMessage,
    origin_group_id: &str,
    status: AuctionStatus,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into auctions
            (auction_id, proposal_id, url, timestamp, quantity, group_id,
             operation, origin_group_id, status)
        values ($1, $2, $3, coalesce($4, now()), $5, $6, $7, $8, $9)
        "#,
    )
    .bind(&msg.auction_id)
    .bind(msg.proposal_id.as_deref().unwrap_or(""))
    .bind(&msg.url)
    .bind(msg.timestamp)
    // Quantities outside i32 collapse to the wire default of 1.
    .bind(i32::try_from(msg.quantity).unwrap_or(1))
    .bind(&msg.group_id)
    .bind(msg.operation.as_str())
    .bind(origin_group_id)
    .bind(status.as_str())
    .execute(conn)
    .await
    .context("auction insert failed")?;
    Ok(())
}

/// Any proposal row carrying this id, regardless of status.
pub async fn fetch_proposal(
    conn: &mut PgConnection,
    proposal_id: &str,
) -> Result<Option<AuctionRow>> {
    let row = sqlx::query(
        "select * from auctions where proposal_id = $1 and operation = 'proposal'",
    )
    .bind(proposal_id)
    .fetch_optional(conn)
    .await
    .context("fetch_proposal failed")?;
    row.as_ref().map(auction_from_row).transpose()
}

/// The still-active proposal a decision refers to, if any.
pub async fn fetch_active_proposal(
    conn: &mut PgConnection,
    proposal_id: &str,
) -> Result<Option<AuctionRow>> {
    let row = sqlx::query(
        r#"
        select * from auctions
        where proposal_id = $1 and operation = 'proposal' and status = 'active'
        "#,
    )
    .bind(proposal_id)
    .fetch_optional(conn)
    .await
    .context("fetch_active_proposal failed")?;
    row.as_ref().map(auction_from_row).transpose()
}

pub async fn set_proposal_status(
    conn: &mut PgConnection,
    proposal_id: &str,
    status: AuctionStatus,
) -> Result<()> {
    sqlx::query(
        r#"
        update auctions
        set status = $1, updated_at = now()
        where proposal_id = $2 and operation = 'proposal'
        "#,
    )
    .bind(status.as_str())
    .bind(proposal_id)
    .execute(conn)
    .await
    .context("set_proposal_status failed")?;
    Ok(())
}

/// On acceptance the original offer row is settled as well.
pub async fn mark_offer_accepted(conn: &mut PgConnection, auction_id: &str) -> Result<()> {
    sqlx::query(
        r#"
        update auctions
        set status = $1, updated_at = now()
        where auction_id = $2 and operation = 'offer'
        "#,
    )
    .bind(AuctionStatus::Accepted.as_str())
    .bind(auction_id)
    .execute(conn)
    .await
    .context("mark_offer_accepted failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// API-layer boundary
// ---------------------------------------------------------------------------

/// Record a locally authored offer/proposal/decision after its announcement
/// was published. The ingest path skips these rows via self-echo suppression.
pub async fn record_local(
    conn: &mut PgConnection,
    msg: &AuctionMessage,
    own_group_id: &str,
    status: AuctionStatus,
) -> Result<()> {
    insert_record(conn, msg, own_group_id, status).await
}

/// Display surface: negotiation rows authored by one group.
pub async fn list_by_origin(pool: &PgPool, origin_group_id: &str) -> Result<Vec<AuctionRow>> {
    let rows = sqlx::query(
        "select * from auctions where origin_group_id = $1 order by created_at desc",
    )
    .bind(origin_group_id)
    .fetch_all(pool)
    .await
    .context("list_by_origin failed")?;
    rows.iter().map(auction_from_row).collect()
}

/// Display surface: active foreign proposals against our own offers.
pub async fn list_open_proposals_for_our_offers(
    pool: &PgPool,
    own_group_id: &str,
) -> Result<Vec<AuctionRow>> {
    let rows = sqlx::query(
        r#"
        select * from auctions
        where operation = 'proposal'
          and status = 'active'
          and auction_id in (
              select auction_id from auctions
              where origin_group_id = $1 and operation = 'offer'
          )
        order by created_at desc
        "#,
    )
    .bind(own_group_id)
    .fetch_all(pool)
    .await
    .context("list_open_proposals_for_our_offers failed")?;
    rows.iter().map(auction_from_row).collect()
}
