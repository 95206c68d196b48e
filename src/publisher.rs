//! Redis Publisher
//!
//! Publishes admitted contracts to a Redis pub/sub channel as JSON, for
//! consumers that prefer a feed over chat messages.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::timeout;
use tracing::debug;

use crate::notifier::{format_message, Notifier, NotifyError};
use crate::registry::ContractEntry;

/// Default Redis channel for discovery messages
pub const DEFAULT_CHANNEL: &str = "contract_discoveries";

/// Default bound on connecting and on each publish
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Discovery message format for Redis publication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntryMessage {
    /// Contract address, lowercase with 0x prefix
    pub address: String,
    /// Selector with 0x prefix, or "unknown"
    pub method: String,
    /// The two-line text chat destinations receive
    pub text: String,
    /// Unix timestamp in milliseconds when the entry was admitted
    pub timestamp: u64,
}

impl EntryMessage {
    pub fn from_entry(entry: &ContractEntry) -> Self {
        EntryMessage {
            address: entry.address_hex(),
            method: entry.method_label(),
            text: format_message(entry),
            timestamp: current_timestamp_millis(),
        }
    }

    /// Serialize the message to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize a message from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Get current timestamp in milliseconds
pub fn current_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Redis publisher for discovery messages
#[derive(Clone)]
pub struct RedisNotifier {
    connection: MultiplexedConnection,
    channel: String,
    timeout: Duration,
}

impl RedisNotifier {
    /// Create a new publisher with a Redis connection
    ///
    /// # Arguments
    /// * `connection` - An established Redis multiplexed connection
    /// * `channel` - The pub/sub channel name to publish to
    pub fn new(connection: MultiplexedConnection, channel: impl Into<String>) -> Self {
        Self {
            connection,
            channel: channel.into(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// Bound each publish by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Open a connection to `url` and publish on `channel`
    ///
    /// Both the connect and every later publish give up after `after`.
    pub async fn connect(url: &str, channel: impl Into<String>, after: Duration) -> Result<Self, NotifyError> {
        let client = redis::Client::open(url)?;
        let connection = timeout(after, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| NotifyError::Timeout {
                what: format!("connect {url}"),
                after,
            })??;
        Ok(Self::new(connection, channel).with_timeout(after))
    }

    /// Publish a pre-formatted message
    ///
    /// # Returns
    /// The number of subscribers that received the message
    pub async fn publish_message(&self, message: &EntryMessage) -> Result<i64, NotifyError> {
        let json = message.to_json()?;
        let mut connection = self.connection.clone();
        let subscribers: i64 = timeout(self.timeout, connection.publish(&self.channel, &json))
            .await
            .map_err(|_| NotifyError::Timeout {
                what: format!("publish to {}", self.channel),
                after: self.timeout,
            })??;
        Ok(subscribers)
    }

    /// Get the channel name
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[async_trait]
impl Notifier for RedisNotifier {
    async fn notify(&self, entry: &ContractEntry) -> Result<(), NotifyError> {
        let subscribers = self.publish_message(&EntryMessage::from_entry(entry)).await?;
        debug!(channel = %self.channel, subscribers, "Published discovery");
        Ok(())
    }
}
