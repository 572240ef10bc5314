//! Wallets and the append-only transaction ledger.
//!
//! Balances never go negative: the settlement handler checks before debiting
//! and the `ck_wallets_balance_nonnegative` constraint backs it up.

use anyhow::{Context, Result};
use sqlx::{PgConnection, Row};
use uuid::Uuid;

pub async fn balance(conn: &mut PgConnection, user_id: &str) -> Result<Option<f64>> {
    let row = sqlx::query("select balance from wallets where user_id = $1")
        .bind(user_id)
        .fetch_optional(conn)
        .await
        .context("wallet balance query failed")?;
    row.map(|r| r.try_get("balance").context("balance column"))
        .transpose()
}

pub async fn debit(conn: &mut PgConnection, user_id: &str, amount: f64) -> Result<()> {
    sqlx::query(
        "update wallets set balance = balance - $1, updated_at = now() where user_id = $2",
    )
    .bind(amount)
    .bind(user_id)
    .execute(conn)
    .await
    .context("wallet debit failed")?;
    Ok(())
}

/// Deposit path (API layer).
pub async fn credit(conn: &mut PgConnection, user_id: &str, amount: f64) -> Result<()> {
    sqlx::query(
        r#"
        insert into wallets (user_id, balance) values ($1, $2)
        on conflict (user_id) do update
            set balance = wallets.balance + excluded.balance, updated_at = now()
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .execute(conn)
    .await
    .context("wallet credit failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct NewTransaction<'a> {
    pub user_id: &'a str,
    pub tx_type: &'a str,
    pub amount: f64,
    pub description: &'a str,
    pub property_id: Option<&'a str>,
}

/// Append one immutable ledger entry. Returns the generated id.
pub async fn insert_transaction(
    conn: &mut PgConnection,
    tx: &NewTransaction<'_>,
) -> Result<String> {
    let id = format!("tx_{}", &Uuid::new_v4().simple().to_string()[..8]);
    sqlx::query(
        r#"
        insert into transactions (id, user_id, type, amount, description, property_id)
        values ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&id)
    .bind(tx.user_id)
    .bind(tx.tx_type)
    .bind(tx.amount)
    .bind(tx.description)
    .bind(tx.property_id)
    .execute(conn)
    .await
    .context("insert_transaction failed")?;
    Ok(id)
}

#[derive(Debug, Clone)]
pub struct UserContact {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Contact details for the best-effort settlement notifications.
pub async fn fetch_user_contact(
    conn: &mut PgConnection,
    user_id: &str,
) -> Result<Option<UserContact>> {
    let row = sqlx::query("select name, email from users where user_id = $1")
        .bind(user_id)
        .fetch_optional(conn)
        .await
        .context("fetch_user_contact failed")?;
    Ok(row.map(|r| UserContact {
        name: r.try_get("name").ok().flatten(),
        email: r.try_get("email").ok().flatten(),
    }))
}

/// Test/bootstrap helper: ensure a user row exists.
pub async fn upsert_user(
    conn: &mut PgConnection,
    user_id: &str,
    name: Option<&str>,
    email: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into users (user_id, name, email) values ($1, $2, $3)
        on conflict (user_id) do update set name = excluded.name, email = excluded.email
        "#,
    )
    .bind(user_id)
    .bind(name)
    .bind(email)
    .execute(conn)
    .await
    .context("upsert_user failed")?;
    Ok(())
}
