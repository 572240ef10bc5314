//! Notifier double that records every dispatched notification.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use pvm_listener::notify::{Notification, Notifier};
use std::sync::Mutex;

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    /// When set, every dispatch fails (settlement must not care).
    pub fail_all: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        RecordingNotifier {
            sent: Mutex::new(Vec::new()),
            fail_all: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        if self.fail_all {
            return Err(anyhow!("scripted notification failure"));
        }
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification.clone());
        Ok(())
    }
}
