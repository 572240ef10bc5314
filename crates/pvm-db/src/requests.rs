//! Purchase requests: broker-visible rows plus the API-layer creation and
//! compensation paths.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pvm_schemas::{RequestAnnouncement, RequestStatus};
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::{listings, log_event, NewEventLog};

#[derive(Debug, Clone)]
pub struct PurchaseRequestRow {
    pub request_id: String,
    pub user_id: Option<String>,
    pub group_id: String,
    pub url: String,
    pub status: RequestStatus,
    pub amount: Option<f64>,
    pub authorization_code: Option<String>,
    pub is_admin_reservation: bool,
    pub purchased_by_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn request_from_row(row: &sqlx::postgres::PgRow) -> Result<PurchaseRequestRow> {
    let raw_status: String = row.try_get("status")?;
    let status = RequestStatus::parse(&raw_status)
        .with_context(|| format!("invalid status in store: {raw_status}"))?;
    Ok(PurchaseRequestRow {
        request_id: row.try_get("request_id")?,
        user_id: row.try_get("user_id")?,
        group_id: row.try_get("group_id")?,
        url: row.try_get("url")?,
        status,
        amount: row.try_get("amount")?,
        authorization_code: row.try_get("authorization_code")?,
        is_admin_reservation: row.try_get("is_admin_reservation")?,
        purchased_by_user_id: row.try_get("purchased_by_user_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn fetch_request(
    conn: &mut PgConnection,
    request_id: &str,
) -> Result<Option<PurchaseRequestRow>> {
    let row = sqlx::query("select * from purchase_requests where request_id = $1")
        .bind(request_id)
        .fetch_optional(conn)
        .await
        .context("fetch_request failed")?;
    row.as_ref().map(request_from_row).transpose()
}

/// Insert a request first seen on the broker (foreign-group visibility).
/// No owning user; status is already `OK` because the announcement itself is
/// the acknowledgement.
pub async fn insert_foreign_request(
    conn: &mut PgConnection,
    ann: &RequestAnnouncement,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into purchase_requests
            (request_id, user_id, group_id, url, origin, operation, status)
        values ($1, null, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&ann.request_id)
    .bind(&ann.group_id)
    .bind(&ann.url)
    // Hostile origins outside i32 collapse to the default rather than wrap.
    .bind(i32::try_from(ann.origin).unwrap_or_default())
    .bind(&ann.operation)
    .bind(RequestStatus::Ok.as_str())
    .execute(conn)
    .await
    .context("insert_foreign_request failed")?;
    Ok(())
}

pub async fn set_status(
    conn: &mut PgConnection,
    request_id: &str,
    status: RequestStatus,
) -> Result<()> {
    sqlx::query(
        "update purchase_requests set status = $1, updated_at = now() where request_id = $2",
    )
    .bind(status.as_str())
    .bind(request_id)
    .execute(conn)
    .await
    .context("set_status failed")?;
    Ok(())
}

/// Record the settled amount together with the terminal status.
pub async fn set_status_and_amount(
    conn: &mut PgConnection,
    request_id: &str,
    status: RequestStatus,
    amount: f64,
) -> Result<()> {
    sqlx::query(
        r#"
        update purchase_requests
        set status = $1, amount = $2, updated_at = now()
        where request_id = $3
        "#,
    )
    .bind(status.as_str())
    .bind(amount)
    .bind(request_id)
    .execute(conn)
    .await
    .context("set_status_and_amount failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// API-layer boundary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewPurchaseRequest<'a> {
    pub user_id: &'a str,
    pub group_id: &'a str,
    pub url: &'a str,
    pub is_admin_reservation: bool,
}

/// Create a first-party request (status PENDING) and consume one slot.
///
/// The caller then publishes the announcement; on publish failure it must
/// compensate with [`abort_unpublished_request`].
pub async fn create_purchase_request(
    conn: &mut PgConnection,
    req: &NewPurchaseRequest<'_>,
) -> Result<String> {
    let request_id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        insert into purchase_requests
            (request_id, user_id, group_id, url, origin, operation, status,
             is_admin_reservation)
        values ($1, $2, $3, $4, 0, 'BUY', $5, $6)
        "#,
    )
    .bind(&request_id)
    .bind(req.user_id)
    .bind(req.group_id)
    .bind(req.url)
    .bind(RequestStatus::Pending.as_str())
    .bind(req.is_admin_reservation)
    .execute(&mut *conn)
    .await
    .context("create_purchase_request failed")?;

    listings::consume_slot(conn, req.url).await?;
    Ok(request_id)
}

/// Compensation for a request whose announcement never reached the broker:
/// force status ERROR, give the slot back, and leave an audit trace.
pub async fn abort_unpublished_request(
    pool: &PgPool,
    topic: &str,
    request_id: &str,
    url: &str,
) -> Result<()> {
    let mut tx = pool.begin().await.context("abort tx begin")?;
    set_status(&mut tx, request_id, RequestStatus::Error).await?;
    listings::restore_slot(&mut tx, url).await?;
    log_event(
        &mut tx,
        &NewEventLog {
            topic,
            event_type: "REQUEST_SEND_ERROR",
            request_id: Some(request_id),
            url: Some(url),
            status: Some(RequestStatus::Error.as_str()),
            payload: serde_json::json!({ "request_id": request_id, "url": url }),
        },
    )
    .await?;
    tx.commit().await.context("abort tx commit")?;
    Ok(())
}

/// Display surface: a user's requests, newest first.
pub async fn list_requests_for_user(
    pool: &PgPool,
    user_id: &str,
) -> Result<Vec<PurchaseRequestRow>> {
    let rows = sqlx::query(
        "select * from purchase_requests where user_id = $1 order by created_at desc",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("list_requests_for_user failed")?;
    rows.iter().map(request_from_row).collect()
}
