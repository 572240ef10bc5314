//! Environment-driven configuration for the marketplace listener.
//!
//! Production injects env vars directly; dev runs load `.env.local` in the
//! binary before calling [`Config::from_env`]. Missing mandatory vars fail
//! with context rather than defaulting silently.

use anyhow::{Context, Result};
use pvm_schemas::Topic;

pub const ENV_DB_URL: &str = "PVM_DATABASE_URL";
pub const ENV_BROKER_URL: &str = "PVM_BROKER_URL";
pub const ENV_BROKER_USERNAME: &str = "PVM_BROKER_USERNAME";
pub const ENV_BROKER_PASSWORD: &str = "PVM_BROKER_PASSWORD";
pub const ENV_GROUP_ID: &str = "PVM_GROUP_ID";
pub const ENV_INFO_TOPIC: &str = "PVM_INFO_TOPIC";
pub const ENV_REQUESTS_TOPIC: &str = "PVM_REQUESTS_TOPIC";
pub const ENV_VALIDATION_TOPIC: &str = "PVM_VALIDATION_TOPIC";
pub const ENV_AUCTIONS_TOPIC: &str = "PVM_AUCTIONS_TOPIC";
pub const ENV_NOTIFY_URL: &str = "PVM_NOTIFY_URL";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub broker_url: String,
    pub broker_username: Option<String>,
    pub broker_password: Option<String>,
    /// This group's marketplace identifier; used for self-echo suppression.
    pub group_id: String,
    pub topics: TopicMap,
    /// Webhook endpoint for settlement notifications. Absent disables them.
    pub notify_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var(ENV_DB_URL)
            .with_context(|| format!("missing env var {ENV_DB_URL}"))?;
        let broker_url = std::env::var(ENV_BROKER_URL)
            .with_context(|| format!("missing env var {ENV_BROKER_URL}"))?;

        Ok(Config {
            database_url,
            broker_url,
            broker_username: std::env::var(ENV_BROKER_USERNAME).ok(),
            broker_password: std::env::var(ENV_BROKER_PASSWORD).ok(),
            group_id: std::env::var(ENV_GROUP_ID).unwrap_or_else(|_| "gX".to_string()),
            topics: TopicMap::from_env(),
            notify_url: std::env::var(ENV_NOTIFY_URL).ok(),
        })
    }
}

/// Broker topic names for the four logical channels.
#[derive(Debug, Clone)]
pub struct TopicMap {
    pub info: String,
    pub requests: String,
    pub validation: String,
    pub auctions: String,
}

impl Default for TopicMap {
    fn default() -> Self {
        TopicMap {
            info: "properties/info".to_string(),
            requests: "properties/requests".to_string(),
            validation: "properties/validation".to_string(),
            auctions: "properties/auctions".to_string(),
        }
    }
}

impl TopicMap {
    pub fn from_env() -> Self {
        let d = TopicMap::default();
        TopicMap {
            info: std::env::var(ENV_INFO_TOPIC).unwrap_or(d.info),
            requests: std::env::var(ENV_REQUESTS_TOPIC).unwrap_or(d.requests),
            validation: std::env::var(ENV_VALIDATION_TOPIC).unwrap_or(d.validation),
            auctions: std::env::var(ENV_AUCTIONS_TOPIC).unwrap_or(d.auctions),
        }
    }

    pub fn name_of(&self, topic: Topic) -> &str {
        match topic {
            Topic::Info => &self.info,
            Topic::Requests => &self.requests,
            Topic::Validation => &self.validation,
            Topic::Auctions => &self.auctions,
        }
    }

    /// Classify an inbound topic name; unknown names return `None` and the
    /// session drops the frame.
    pub fn classify(&self, name: &str) -> Option<Topic> {
        if name == self.info {
            Some(Topic::Info)
        } else if name == self.requests {
            Some(Topic::Requests)
        } else if name == self.validation {
            Some(Topic::Validation)
        } else if name == self.auctions {
            Some(Topic::Auctions)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_topic_names() {
        let t = TopicMap::default();
        assert_eq!(t.name_of(Topic::Info), "properties/info");
        assert_eq!(t.name_of(Topic::Requests), "properties/requests");
        assert_eq!(t.name_of(Topic::Validation), "properties/validation");
        assert_eq!(t.name_of(Topic::Auctions), "properties/auctions");
    }

    #[test]
    fn classify_round_trips_and_rejects_unknown() {
        let t = TopicMap::default();
        for topic in Topic::ALL {
            assert_eq!(t.classify(t.name_of(topic)), Some(topic));
        }
        assert_eq!(t.classify("properties/other"), None);
    }
}
