//! Catalog upsert handler (`properties/info`).

use anyhow::Result;
use pvm_db::listings::{self, ListingUpsert};
use pvm_schemas::ListingInfo;
use sqlx::PgConnection;
use tracing::info;

/// Reconcile one listing announcement.
///
/// First sight of a url inserts the listing with the announced capacity
/// (default 3). Every later announcement for the same url is a restock
/// signal: descriptive attributes are refreshed, `visit_slots` goes up by
/// exactly 1.
pub async fn handle(conn: &mut PgConnection, announcement: &ListingInfo) -> Result<()> {
    match listings::upsert_from_info(conn, announcement).await? {
        ListingUpsert::Inserted { visit_slots } => {
            info!(url = %announcement.url, visit_slots, "listing created");
        }
        ListingUpsert::Restocked => {
            info!(url = %announcement.url, "listing restocked (+1 slot)");
        }
    }
    Ok(())
}
