//! Postgres store for the marketplace reconciliation engine.
//!
//! The listener is the sole writer of `properties.visit_slots`,
//! `purchase_requests.status`, wallet balances on the settlement path, and
//! `auctions`. The API layer writes purchase requests and local auction rows
//! through the helpers in [`requests`] and [`auctions`].
//!
//! All mutating functions take `&mut PgConnection` so a handler's writes can
//! share one transaction; pool-level variants exist only where a write must
//! survive a rolled-back handler (the audit log).

use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};
use std::time::Duration;
use tracing::warn;

pub mod auctions;
pub mod listings;
pub mod requests;
pub mod wallets;

pub use pvm_config::ENV_DB_URL;

/// Startup retry budget for the initial store connection. The process cannot
/// run without its store, so exhaustion is fatal to the caller.
pub const CONNECT_MAX_ATTEMPTS: u32 = 10;
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Connect to Postgres using PVM_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;
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

/// Connect with a bounded fixed-delay retry loop.
///
/// Used at process start: the store may still be coming up alongside us.
pub async fn connect_with_retry(url: &str, max_attempts: u32, delay: Duration) -> Result<PgPool> {
    let mut last_err = None;
    for attempt in 1..=max_attempts {
        match connect(url).await {
            Ok(pool) => return Ok(pool),
            Err(e) => {
                warn!(attempt, max_attempts, "postgres not ready: {e:#}");
                last_err = Some(e);
                if attempt < max_attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    Err(last_err
        .unwrap_or_else(|| anyhow::anyhow!("no connection attempt made"))
        .context(format!("postgres unreachable after {max_attempts} attempts")))
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='properties'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_properties_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_properties_table: bool,
}

// ---------------------------------------------------------------------------
// Event log (append-only audit trail)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewEventLog<'a> {
    pub topic: &'a str,
    pub event_type: &'a str,
    pub request_id: Option<&'a str>,
    pub url: Option<&'a str>,
    pub status: Option<&'a str>,
    pub payload: Value,
}

/// Append one audit row inside the caller's transaction.
pub async fn log_event(conn: &mut PgConnection, ev: &NewEventLog<'_>) -> Result<()> {
    sqlx::query(
        r#"
        insert into event_log (topic, event_type, request_id, url, status, payload)
        values ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(ev.topic)
    .bind(ev.event_type)
    .bind(ev.request_id)
    .bind(ev.url)
    .bind(ev.status)
    .bind(&ev.payload)
    .execute(conn)
    .await
    .context("log_event insert failed")?;
    Ok(())
}

/// Append one audit row on the pool, outside any handler transaction.
///
/// Used when a handler's transaction rolled back: the raw message must still
/// leave a trace for operators.
pub async fn log_event_pool(pool: &PgPool, ev: &NewEventLog<'_>) -> Result<()> {
    let mut conn = pool.acquire().await.context("acquire for log_event")?;
    log_event(&mut conn, ev).await
}
