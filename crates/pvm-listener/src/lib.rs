//! Reconciliation engine for the shared property-visit marketplace.
//!
//! A single long-lived broker session feeds out-of-order, possibly duplicated
//! messages from four topics into one strictly sequential dispatcher; each
//! message is handled inside its own store transaction and audited.

pub mod engine;
pub mod handlers;
pub mod notify;
