//! WebSocket session against the shared marketplace broker.
//!
//! The broker speaks JSON control frames over a single WebSocket:
//!
//! - client → broker: `{"type":"auth", "username", "password"}` (optional),
//!   `{"type":"subscribe", "topic"}`, `{"type":"publish", "id", "topic",
//!   "payload"}`, `{"type":"ack", "id"}`
//! - broker → client: `{"type":"message", "id"?, "topic", "payload"}`,
//!   `{"type":"puback", "id"}`
//!
//! Publishes are acknowledged per message (`puback`), inbound messages are
//! redelivered until `ack`ed.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::warn;

use crate::{BrokerTransport, InboundFrame};

/// How long one publish attempt waits for its `puback`.
const PUBACK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct WsSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_publish_id: u64,
    /// Messages that arrived while we were waiting for a puback.
    buffered: VecDeque<InboundFrame>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WsInbound {
    Message {
        id: Option<u64>,
        topic: String,
        payload: Value,
    },
    Puback {
        id: u64,
    },
}

impl WsSession {
    /// Open the session and authenticate when credentials are configured.
    pub async fn connect(
        url: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self> {
        let (stream, _resp) = connect_async(url)
            .await
            .with_context(|| format!("broker connect failed: {url}"))?;

        let mut session = WsSession {
            stream,
            next_publish_id: 1,
            buffered: VecDeque::new(),
        };

        if let (Some(user), Some(pass)) = (username, password) {
            session
                .send_frame(json!({ "type": "auth", "username": user, "password": pass }))
                .await
                .context("broker auth frame failed")?;
        }

        Ok(session)
    }

    async fn send_frame(&mut self, frame: Value) -> Result<()> {
        self.stream
            .send(Message::Text(frame.to_string()))
            .await
            .context("ws send failed")?;
        Ok(())
    }

    /// Read raw frames until one decodes as a broker control frame.
    /// `Ok(None)` means the peer closed.
    async fn read_inbound(&mut self) -> Result<Option<WsInbound>> {
        while let Some(msg) = self.stream.next().await {
            match msg.context("ws receive failed")? {
                Message::Text(text) => match serde_json::from_str::<WsInbound>(&text) {
                    Ok(frame) => return Ok(Some(frame)),
                    Err(e) => {
                        warn!("unrecognized broker frame dropped: {e}");
                    }
                },
                Message::Ping(data) => {
                    self.stream
                        .send(Message::Pong(data))
                        .await
                        .context("ws pong failed")?;
                }
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }

    fn frame_from(topic: String, payload: Value, id: Option<u64>) -> InboundFrame {
        InboundFrame {
            topic,
            payload: payload.to_string(),
            delivery_id: id,
        }
    }
}

#[async_trait]
impl BrokerTransport for WsSession {
    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        self.send_frame(json!({ "type": "subscribe", "topic": topic }))
            .await
            .with_context(|| format!("subscribe failed: {topic}"))
    }

    async fn next_frame(&mut self) -> Result<Option<InboundFrame>> {
        if let Some(frame) = self.buffered.pop_front() {
            return Ok(Some(frame));
        }
        loop {
            match self.read_inbound().await? {
                Some(WsInbound::Message { id, topic, payload }) => {
                    return Ok(Some(Self::frame_from(topic, payload, id)));
                }
                // A puback with no waiting publish is stale; drop it.
                Some(WsInbound::Puback { .. }) => continue,
                None => return Ok(None),
            }
        }
    }

    async fn ack(&mut self, delivery_id: u64) -> Result<()> {
        self.send_frame(json!({ "type": "ack", "id": delivery_id }))
            .await
    }

    async fn publish_acked(&mut self, topic: &str, payload: &str) -> Result<()> {
        let id = self.next_publish_id;
        self.next_publish_id += 1;

        let payload: Value =
            serde_json::from_str(payload).context("publish payload is not valid JSON")?;
        self.send_frame(json!({
            "type": "publish",
            "id": id,
            "topic": topic,
            "payload": payload,
        }))
        .await?;

        // Wait for our puback, buffering any messages that arrive meanwhile.
        let wait = async {
            loop {
                match self.read_inbound().await? {
                    Some(WsInbound::Puback { id: acked }) if acked == id => return Ok(()),
                    Some(WsInbound::Puback { .. }) => continue,
                    Some(WsInbound::Message { id, topic, payload }) => {
                        self.buffered.push_back(Self::frame_from(topic, payload, id));
                    }
                    None => return Err(anyhow!("broker closed before puback")),
                }
            }
        };

        tokio::time::timeout(PUBACK_TIMEOUT, wait)
            .await
            .map_err(|_| anyhow!("publish ack timed out after {PUBACK_TIMEOUT:?}"))?
    }
}
