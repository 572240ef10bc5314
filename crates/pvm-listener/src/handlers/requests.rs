//! Purchase-request reconciler (`properties/requests`).

use anyhow::Result;
use pvm_db::{listings, requests};
use pvm_schemas::{RequestAnnouncement, RequestStatus};
use sqlx::PgConnection;
use tracing::info;

/// Reconcile one purchase-intent announcement, idempotent on `request_id`.
///
/// A known id only has its status refreshed to `OK`; the slot was already
/// consumed on first sight (either here for a foreign request, or by the API
/// layer for a first-party one). A new id is recorded as a foreign request
/// and consumes exactly one slot, floored at 0.
pub async fn handle(conn: &mut PgConnection, ann: &RequestAnnouncement) -> Result<()> {
    if let Some(existing) = requests::fetch_request(conn, &ann.request_id).await? {
        // A settled request stays settled; only a live one is refreshed.
        if !existing.status.is_terminal() {
            requests::set_status(conn, &ann.request_id, RequestStatus::Ok).await?;
        }
        info!(request_id = %ann.request_id, "known request re-announced; no slot consumed");
        return Ok(());
    }

    requests::insert_foreign_request(conn, ann).await?;
    listings::consume_slot(conn, &ann.url).await?;
    info!(
        request_id = %ann.request_id,
        group_id = %ann.group_id,
        url = %ann.url,
        "foreign request recorded; one slot consumed"
    );
    Ok(())
}
