//! Best-effort settlement notifications.
//!
//! Dispatch happens after the settlement transaction commits; a failed
//! notification is logged and swallowed, never rolled back into the store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// One user-facing settlement notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    PaymentAccepted {
        user_id: String,
        name: String,
        email: String,
        request_id: String,
        url: String,
        amount: f64,
    },
    PaymentRejected {
        user_id: String,
        name: String,
        email: String,
        request_id: String,
        url: String,
        reason: Option<String>,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

#[async_trait]
impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    async fn send(&self, notification: &Notification) -> Result<()> {
        (**self).send(notification).await
    }
}

/// Used when no notification endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send(&self, _notification: &Notification) -> Result<()> {
        Ok(())
    }
}

/// Posts notifications to the mail/notification service as JSON.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookNotifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        WebhookNotifier {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let body = match notification {
            Notification::PaymentAccepted {
                user_id,
                name,
                email,
                request_id,
                url,
                amount,
            } => json!({
                "kind": "payment_accepted",
                "user_id": user_id,
                "name": name,
                "email": email,
                "request_id": request_id,
                "property_url": url,
                "amount": amount,
            }),
            Notification::PaymentRejected {
                user_id,
                name,
                email,
                request_id,
                url,
                reason,
            } => json!({
                "kind": "payment_rejected",
                "user_id": user_id,
                "name": name,
                "email": email,
                "request_id": request_id,
                "property_url": url,
                "reason": reason,
            }),
        };

        self.client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .context("notification request failed")?
            .error_for_status()
            .context("notification endpoint returned an error")?;
        Ok(())
    }
}
