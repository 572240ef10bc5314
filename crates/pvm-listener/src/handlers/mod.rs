//! Topic-specific reconciliation handlers.
//!
//! Every handler runs inside the transaction the dispatcher opened for the
//! message; an `Err` rolls back all of the handler's writes.

pub mod auctions;
pub mod catalog;
pub mod requests;
pub mod settlement;
