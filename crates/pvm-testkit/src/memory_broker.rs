//! In-memory broker session: scripted inbound frames, recorded outbound
//! publishes, injectable publish failures.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use pvm_broker::{BrokerTransport, InboundFrame};
use serde_json::Value;
use std::collections::VecDeque;

#[derive(Default)]
pub struct MemoryBroker {
    inbound: VecDeque<InboundFrame>,
    next_delivery_id: u64,
    /// Topics subscribed in order.
    pub subscriptions: Vec<String>,
    /// Every successful publish as `(topic, payload)`.
    pub published: Vec<(String, String)>,
    /// Delivery ids the session acknowledged, in order.
    pub acked: Vec<u64>,
    /// The next N publish attempts fail (for retry/backoff tests).
    pub publish_failures: u32,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script one inbound message; returns its delivery id.
    pub fn push_message(&mut self, topic: &str, payload: &Value) -> u64 {
        self.next_delivery_id += 1;
        let id = self.next_delivery_id;
        self.inbound.push_back(InboundFrame {
            topic: topic.to_string(),
            payload: payload.to_string(),
            delivery_id: Some(id),
        });
        id
    }

    /// Script a frame whose payload is not JSON (malformed-message tests).
    pub fn push_raw(&mut self, topic: &str, payload: &str) -> u64 {
        self.next_delivery_id += 1;
        let id = self.next_delivery_id;
        self.inbound.push_back(InboundFrame {
            topic: topic.to_string(),
            payload: payload.to_string(),
            delivery_id: Some(id),
        });
        id
    }

    pub fn fail_next_publishes(&mut self, n: u32) {
        self.publish_failures = n;
    }
}

#[async_trait]
impl BrokerTransport for MemoryBroker {
    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        self.subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<InboundFrame>> {
        Ok(self.inbound.pop_front())
    }

    async fn ack(&mut self, delivery_id: u64) -> Result<()> {
        self.acked.push(delivery_id);
        Ok(())
    }

    async fn publish_acked(&mut self, topic: &str, payload: &str) -> Result<()> {
        if self.publish_failures > 0 {
            self.publish_failures -= 1;
            return Err(anyhow!("scripted publish failure"));
        }
        self.published.push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}
