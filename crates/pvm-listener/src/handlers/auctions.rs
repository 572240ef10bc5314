//! Auction exchange handler (`properties/auctions`).
//!
//! Three-phase negotiation keyed by `(auction_id, operation)`: a foreign
//! group's *offer*, our-or-their *proposal* against it, and a terminal
//! *acceptance*/*rejection* referencing the proposal.

use anyhow::Result;
use pvm_db::auctions;
use pvm_schemas::{AuctionMessage, AuctionOp, AuctionStatus};
use sqlx::PgConnection;
use tracing::{debug, info, warn};

/// Reconcile one auction-channel message.
///
/// Messages authored by this group are echoes of rows the API layer already
/// persisted before publishing, so they are audited but never re-applied.
pub async fn handle(conn: &mut PgConnection, msg: &AuctionMessage, own_group_id: &str) -> Result<()> {
    if msg.group_id == own_group_id {
        debug!(auction_id = %msg.auction_id, "self-echo suppressed");
        return Ok(());
    }

    match msg.operation {
        AuctionOp::Offer => handle_offer(conn, msg).await,
        AuctionOp::Proposal => handle_proposal(conn, msg).await,
        AuctionOp::Acceptance => handle_decision(conn, msg, AuctionStatus::Accepted).await,
        AuctionOp::Rejection => handle_decision(conn, msg, AuctionStatus::Rejected).await,
    }
}

/// A foreign group announces a bundle it is willing to trade.
async fn handle_offer(conn: &mut PgConnection, msg: &AuctionMessage) -> Result<()> {
    if auctions::offer_exists(conn, &msg.auction_id).await? {
        // Redelivery: refresh status/timestamp, never duplicate the row.
        auctions::refresh_offer(conn, &msg.auction_id).await?;
        info!(auction_id = %msg.auction_id, "offer redelivered; refreshed");
        return Ok(());
    }

    auctions::insert_record(conn, msg, &msg.group_id, AuctionStatus::Active).await?;
    info!(
        auction_id = %msg.auction_id,
        group_id = %msg.group_id,
        url = %msg.url,
        quantity = msg.quantity,
        "foreign offer recorded"
    );
    Ok(())
}

/// A foreign group counter-bids one of our offers.
async fn handle_proposal(conn: &mut PgConnection, msg: &AuctionMessage) -> Result<()> {
    let Some(proposal_id) = msg.proposal_id.as_deref() else {
        warn!(auction_id = %msg.auction_id, "proposal without proposal_id dropped");
        return Ok(());
    };

    // A proposal we already hold (active or decided) must not be resurrected
    // or duplicated by redelivery.
    if auctions::fetch_proposal(conn, proposal_id).await?.is_some() {
        info!(proposal_id, "proposal redelivered; ignored");
        return Ok(());
    }

    auctions::insert_record(conn, msg, &msg.group_id, AuctionStatus::Active).await?;
    info!(
        auction_id = %msg.auction_id,
        proposal_id,
        group_id = %msg.group_id,
        "foreign proposal recorded"
    );
    Ok(())
}

/// A terminal decision on a proposal we authored.
async fn handle_decision(
    conn: &mut PgConnection,
    msg: &AuctionMessage,
    decision: AuctionStatus,
) -> Result<()> {
    let Some(proposal_id) = msg.proposal_id.as_deref() else {
        warn!(auction_id = %msg.auction_id, "decision without proposal_id dropped");
        return Ok(());
    };

    // A decision referencing a proposal we do not hold as active is a no-op:
    // either it never reached us or it was already decided.
    let Some(proposal) = auctions::fetch_active_proposal(conn, proposal_id).await? else {
        info!(proposal_id, "decision for unknown or settled proposal ignored");
        return Ok(());
    };

    auctions::set_proposal_status(conn, proposal_id, decision).await?;
    if decision == AuctionStatus::Accepted {
        auctions::mark_offer_accepted(conn, &proposal.auction_id).await?;
    }
    info!(
        auction_id = %proposal.auction_id,
        proposal_id,
        status = decision.as_str(),
        "proposal settled"
    );
    Ok(())
}
