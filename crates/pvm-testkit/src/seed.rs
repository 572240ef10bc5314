//! Store seeding helpers for scenario tests.

use anyhow::Result;
use sqlx::PgPool;

/// Insert a listing directly, bypassing the info handler.
pub async fn listing(pool: &PgPool, url: &str, price: f64, visit_slots: i32) -> Result<()> {
    sqlx::query(
        r#"
        insert into properties (url, name, price, visit_slots)
        values ($1, 'seeded listing', $2, $3)
        on conflict (url) do update set price = excluded.price,
                                        visit_slots = excluded.visit_slots
        "#,
    )
    .bind(url)
    .bind(price)
    .bind(visit_slots)
    .execute(pool)
    .await?;
    Ok(())
}

/// Insert a user with a funded wallet.
pub async fn user_with_wallet(pool: &PgPool, user_id: &str, balance: f64) -> Result<()> {
    let mut conn = pool.acquire().await?;
    pvm_db::wallets::upsert_user(
        &mut conn,
        user_id,
        Some("Test User"),
        Some("user@example.test"),
    )
    .await?;
    sqlx::query(
        r#"
        insert into wallets (user_id, balance) values ($1, $2)
        on conflict (user_id) do update set balance = excluded.balance
        "#,
    )
    .bind(user_id)
    .bind(balance)
    .execute(pool)
    .await?;
    Ok(())
}

/// Attach an owner to a broker-created purchase request so the settlement
/// path exercises the wallet branch.
pub async fn claim_request(
    pool: &PgPool,
    request_id: &str,
    user_id: &str,
    is_admin_reservation: bool,
) -> Result<()> {
    sqlx::query(
        r#"
        update purchase_requests
        set user_id = $1, is_admin_reservation = $2
        where request_id = $3
        "#,
    )
    .bind(user_id)
    .bind(is_admin_reservation)
    .bind(request_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn slots(pool: &PgPool, url: &str) -> Result<i32> {
    let (n,): (i32,) = sqlx::query_as("select visit_slots from properties where url = $1")
        .bind(url)
        .fetch_one(pool)
        .await?;
    Ok(n)
}

pub async fn wallet_balance(pool: &PgPool, user_id: &str) -> Result<f64> {
    let (b,): (f64,) = sqlx::query_as("select balance from wallets where user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(b)
}

pub async fn request_status(pool: &PgPool, request_id: &str) -> Result<String> {
    let (s,): (String,) =
        sqlx::query_as("select status from purchase_requests where request_id = $1")
            .bind(request_id)
            .fetch_one(pool)
            .await?;
    Ok(s)
}
