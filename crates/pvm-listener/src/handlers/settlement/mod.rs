//! Settlement handler (`properties/validation`).
//!
//! Drives a purchase request to a terminal status and performs the paired
//! wallet debit / slot restore. The only writer of wallet balances and the
//! transaction ledger on the broker-driven path.

pub mod transition;

use anyhow::Result;
use pvm_db::{listings, requests, wallets};
use pvm_schemas::{RequestStatus, ValidationOutcome};
use sqlx::PgConnection;
use tracing::{info, warn};

use crate::notify::Notification;
use transition::{plan, SideEffect};

/// Fraction of the listing price charged when an acceptance settles.
const BOOKING_FEE_RATE: f64 = 0.10;

/// Apply one validation outcome.
///
/// Returns the notifications to dispatch after the surrounding transaction
/// commits; the financial writes must never wait on a mail server.
pub async fn handle(
    conn: &mut PgConnection,
    outcome: &ValidationOutcome,
) -> Result<Vec<Notification>> {
    // Out-of-order validation for a request we have never seen is a no-op.
    let Some(request) = requests::fetch_request(conn, &outcome.request_id).await? else {
        info!(request_id = %outcome.request_id, "validation for unknown request ignored");
        return Ok(Vec::new());
    };

    let step = plan(request.status, outcome.status, request.is_admin_reservation);
    let Some(new_status) = step.new_status else {
        info!(
            request_id = %outcome.request_id,
            current = request.status.as_str(),
            incoming = outcome.status.as_str(),
            "validation is a no-op"
        );
        return Ok(Vec::new());
    };

    requests::set_status(conn, &outcome.request_id, new_status).await?;

    let mut notifications = Vec::new();

    if step.effects.contains(&SideEffect::DebitWallet) {
        // Foreign requests carry no local owner; their group settles its own
        // wallet. Only the status transition is recorded here.
        if let Some(user_id) = request.user_id.as_deref() {
            let price = listings::latest_price(conn, &request.url).await?.unwrap_or(0.0);
            let amount = price * BOOKING_FEE_RATE;
            let balance = wallets::balance(conn, user_id).await?.unwrap_or(0.0);

            if balance < amount {
                // Abort the acceptance: no debit, status forced to ERROR,
                // and the slot consumed on first sight is given back.
                warn!(
                    request_id = %outcome.request_id,
                    balance,
                    required = amount,
                    "insufficient funds; acceptance aborted"
                );
                requests::set_status(conn, &outcome.request_id, RequestStatus::Error).await?;
                listings::restore_slot(conn, &request.url).await?;
                return Ok(Vec::new());
            }

            wallets::debit(conn, user_id, amount).await?;
            wallets::insert_transaction(
                conn,
                &wallets::NewTransaction {
                    user_id,
                    tx_type: "purchase",
                    amount,
                    description: "Visit booking charge (10%)",
                    property_id: Some(&request.url),
                },
            )
            .await?;
            requests::set_status_and_amount(
                conn,
                &outcome.request_id,
                RequestStatus::Accepted,
                amount,
            )
            .await?;
            info!(request_id = %outcome.request_id, amount, "acceptance settled; wallet debited");

            if step.effects.contains(&SideEffect::NotifyAccepted) {
                if let Some(contact) = contact_with_email(conn, user_id).await? {
                    notifications.push(Notification::PaymentAccepted {
                        user_id: user_id.to_string(),
                        name: contact.0,
                        email: contact.1,
                        request_id: outcome.request_id.clone(),
                        url: request.url.clone(),
                        amount,
                    });
                }
            }
        }
    }

    if step.effects.contains(&SideEffect::RestoreSlot) {
        listings::restore_slot(conn, &request.url).await?;
        info!(
            request_id = %outcome.request_id,
            status = new_status.as_str(),
            url = %request.url,
            "slot restored"
        );
    }

    if step.effects.contains(&SideEffect::NotifyRejected) {
        if let Some(user_id) = request.user_id.as_deref() {
            if let Some(contact) = contact_with_email(conn, user_id).await? {
                notifications.push(Notification::PaymentRejected {
                    user_id: user_id.to_string(),
                    name: contact.0,
                    email: contact.1,
                    request_id: outcome.request_id.clone(),
                    url: request.url.clone(),
                    reason: outcome.reason.clone(),
                });
            }
        }
    }

    Ok(notifications)
}

async fn contact_with_email(
    conn: &mut PgConnection,
    user_id: &str,
) -> Result<Option<(String, String)>> {
    let Some(contact) = wallets::fetch_user_contact(conn, user_id).await? else {
        return Ok(None);
    };
    let Some(email) = contact.email else {
        return Ok(None);
    };
    Ok(Some((
        contact.name.unwrap_or_else(|| "there".to_string()),
        email,
    )))
}
