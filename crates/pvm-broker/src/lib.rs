//! Broker transport seam for the marketplace.
//!
//! The engine and the API layer talk to the shared broker through
//! [`BrokerTransport`]; production uses the WebSocket session in [`ws`],
//! tests use the in-memory broker from `pvm-testkit`.
//!
//! Delivery guarantees: publishes are acknowledged per message (at-least-once
//! out), and inbound frames carry a delivery id the session acknowledges once
//! the message has been handled or deliberately dropped (at-least-once in).

pub mod publisher;
pub mod ws;

use anyhow::Result;
use async_trait::async_trait;

pub use publisher::{fibonacci_schedule, ReliablePublisher, DEFAULT_PUBLISH_ATTEMPTS};

/// One inbound application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub topic: String,
    /// Raw UTF-8 JSON payload, decoded downstream by `pvm-schemas`.
    pub payload: String,
    /// Broker delivery id; present when the subscription is acknowledged.
    pub delivery_id: Option<u64>,
}

/// A live session against the marketplace broker.
///
/// Implementations are single-session: one connection, one subscription set,
/// frames delivered in arrival order.
#[async_trait]
pub trait BrokerTransport: Send {
    async fn subscribe(&mut self, topic: &str) -> Result<()>;

    /// Next inbound frame in arrival order. `Ok(None)` means the broker
    /// closed the connection.
    async fn next_frame(&mut self) -> Result<Option<InboundFrame>>;

    /// Acknowledge a delivered frame so the broker stops redelivering it.
    async fn ack(&mut self, delivery_id: u64) -> Result<()>;

    /// One acknowledged publish attempt. An `Err` is one failed attempt;
    /// retry policy lives in [`ReliablePublisher`], not here.
    async fn publish_acked(&mut self, topic: &str, payload: &str) -> Result<()>;
}
