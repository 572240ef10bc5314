//! Broker session manager and message dispatcher.
//!
//! One session, one subscription set, strictly sequential processing: frames
//! are handled one at a time in arrival order, each inside its own store
//! transaction. A handler failure aborts only that message's transaction; the
//! audit row for the raw message is still attempted on the pool so operators
//! never lose the trace.

use anyhow::{Context, Result};
use pvm_broker::{BrokerTransport, InboundFrame};
use pvm_config::TopicMap;
use pvm_db::NewEventLog;
use pvm_schemas::{InboundEvent, Topic};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::handlers;
use crate::notify::{Notification, Notifier};

pub struct ListenerSession<T, N> {
    pool: PgPool,
    transport: T,
    notifier: N,
    topics: TopicMap,
    group_id: String,
}

impl<T: BrokerTransport, N: Notifier> ListenerSession<T, N> {
    pub fn new(
        pool: PgPool,
        transport: T,
        notifier: N,
        topics: TopicMap,
        group_id: String,
    ) -> Self {
        ListenerSession {
            pool,
            transport,
            notifier,
            topics,
            group_id,
        }
    }

    /// Hand the transport back, e.g. to inspect a test double.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Subscribe to the four topics and process frames until the broker
    /// closes the stream.
    pub async fn run(&mut self) -> Result<()> {
        for topic in Topic::ALL {
            let name = self.topics.name_of(topic).to_string();
            self.transport
                .subscribe(&name)
                .await
                .with_context(|| format!("subscribe failed: {name}"))?;
            info!(topic = %name, "subscribed");
        }

        while let Some(frame) = self.transport.next_frame().await? {
            self.process(frame).await;
        }
        Ok(())
    }

    /// Handle one frame and acknowledge its delivery.
    ///
    /// Never returns an error: every failure mode here is either a deliberate
    /// drop (malformed payload) or scoped to this message's transaction.
    pub async fn process(&mut self, frame: InboundFrame) {
        self.handle_frame(&frame).await;

        if let Some(id) = frame.delivery_id {
            if let Err(e) = self.transport.ack(id).await {
                warn!(delivery_id = id, "delivery ack failed: {e:#}");
            }
        }
    }

    async fn handle_frame(&mut self, frame: &InboundFrame) {
        let Some(topic) = self.topics.classify(&frame.topic) else {
            warn!(topic = %frame.topic, "frame on unknown topic dropped");
            return;
        };

        let event = match InboundEvent::decode(topic, &frame.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(topic = %frame.topic, "malformed message dropped: {e}");
                self.audit_outside_tx(&frame.topic, "MALFORMED", None, None, None, frame)
                    .await;
                return;
            }
        };

        let meta = AuditMeta::for_event(&event);
        match self.apply(&frame.topic, &event, &meta, frame).await {
            Ok(notifications) => {
                for notification in &notifications {
                    if let Err(e) = self.notifier.send(notification).await {
                        // Best effort only: the financial mutation is already
                        // committed and must not be rolled back.
                        warn!("notification dispatch failed: {e:#}");
                    }
                }
                info!(topic = %frame.topic, event = meta.event_type, "event processed");
            }
            Err(e) => {
                error!(
                    topic = %frame.topic,
                    event = meta.event_type,
                    "handler failed, transaction rolled back: {e:#}"
                );
                self.audit_outside_tx(
                    &frame.topic,
                    meta.event_type,
                    meta.request_id.as_deref(),
                    meta.url.as_deref(),
                    Some("ERROR"),
                    frame,
                )
                .await;
            }
        }
    }

    /// One message, one transaction: audit row plus all handler writes commit
    /// or roll back together.
    async fn apply(
        &self,
        topic_name: &str,
        event: &InboundEvent,
        meta: &AuditMeta,
        frame: &InboundFrame,
    ) -> Result<Vec<Notification>> {
        let mut tx = self.pool.begin().await.context("tx begin failed")?;

        pvm_db::log_event(
            &mut tx,
            &NewEventLog {
                topic: topic_name,
                event_type: meta.event_type,
                request_id: meta.request_id.as_deref(),
                url: meta.url.as_deref(),
                status: meta.status,
                payload: raw_payload(frame),
            },
        )
        .await?;

        let notifications = match event {
            InboundEvent::Info(announcement) => {
                handlers::catalog::handle(&mut tx, announcement).await?;
                Vec::new()
            }
            InboundEvent::Request(announcement) => {
                handlers::requests::handle(&mut tx, announcement).await?;
                Vec::new()
            }
            InboundEvent::Validation(outcome) => {
                handlers::settlement::handle(&mut tx, outcome).await?
            }
            InboundEvent::Auction(msg) => {
                handlers::auctions::handle(&mut tx, msg, &self.group_id).await?;
                Vec::new()
            }
        };

        tx.commit().await.context("tx commit failed")?;
        Ok(notifications)
    }

    /// Best-effort audit write on the pool, for messages whose transaction
    /// never existed (malformed) or rolled back.
    async fn audit_outside_tx(
        &self,
        topic: &str,
        event_type: &'static str,
        request_id: Option<&str>,
        url: Option<&str>,
        status: Option<&'static str>,
        frame: &InboundFrame,
    ) {
        let ev = NewEventLog {
            topic,
            event_type,
            request_id,
            url,
            status,
            payload: raw_payload(frame),
        };
        if let Err(e) = pvm_db::log_event_pool(&self.pool, &ev).await {
            error!("audit write failed: {e:#}");
        }
    }
}

fn raw_payload(frame: &InboundFrame) -> Value {
    serde_json::from_str(&frame.payload)
        .unwrap_or_else(|_| Value::String(frame.payload.clone()))
}

/// Event-log classification and correlation for one decoded event.
struct AuditMeta {
    event_type: &'static str,
    request_id: Option<String>,
    url: Option<String>,
    status: Option<&'static str>,
}

impl AuditMeta {
    fn for_event(event: &InboundEvent) -> Self {
        match event {
            InboundEvent::Info(i) => AuditMeta {
                event_type: "PROPERTY_INFO",
                request_id: None,
                url: Some(i.url.clone()),
                status: None,
            },
            InboundEvent::Request(r) => AuditMeta {
                event_type: "REQUEST_RECEIVED",
                request_id: Some(r.request_id.clone()),
                url: Some(r.url.clone()),
                status: Some("OK"),
            },
            InboundEvent::Validation(v) => AuditMeta {
                event_type: "VALIDATION_RECEIVED",
                request_id: Some(v.request_id.clone()),
                url: None,
                status: Some(v.status.as_str()),
            },
            InboundEvent::Auction(a) => AuditMeta {
                event_type: "AUCTION_RECEIVED",
                request_id: None,
                url: Some(a.url.clone()),
                status: None,
            },
        }
    }
}
