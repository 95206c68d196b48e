//! Block Subscription
//!
//! Connects to a node over WebSocket and streams new block numbers.
//! Reconnection pacing is described by [`ReconnectPolicy`]; the listener drives
//! the reconnect loop.

use std::time::Duration;

use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::time::timeout;
use tracing::info;

use crate::chain::ChainError;

/// Maximum number of consecutive reconnection attempts before giving up
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Initial backoff delay for reconnection
pub const INITIAL_BACKOFF_MS: u64 = 100;

/// Maximum backoff delay for reconnection
pub const MAX_BACKOFF_MS: u64 = 30000;

/// Connection timeout in milliseconds, also applied to the subscribe request
pub const CONNECTION_TIMEOUT_MS: u64 = 5000;

/// Reconnection pacing for the block subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Maximum consecutive reconnection attempts
    pub max_attempts: u32,
    /// Initial backoff delay in milliseconds
    pub initial_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
        }
    }
}

impl ReconnectPolicy {
    /// Calculate backoff delay for a given attempt number
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_backoff_ms.saturating_mul(2u64.pow(attempt.min(10)));
        Duration::from_millis(delay_ms.min(self.max_backoff_ms))
    }
}

/// A source of new-block notifications, delivered in increasing order
#[async_trait]
pub trait BlockFeed: Send + Sync {
    /// Open a fresh subscription. The stream ends when the connection drops.
    async fn subscribe(&self) -> Result<BoxStream<'static, u64>, ChainError>;
}

/// `BlockFeed` over a WebSocket `eth_subscribe("newHeads")`
#[derive(Debug, Clone)]
pub struct WsBlockFeed {
    url: String,
    connect_timeout: Duration,
}

impl WsBlockFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_millis(CONNECTION_TIMEOUT_MS),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl BlockFeed for WsBlockFeed {
    async fn subscribe(&self) -> Result<BoxStream<'static, u64>, ChainError> {
        info!(url = %self.url, "Connecting to block subscription endpoint");

        let provider = timeout(
            self.connect_timeout,
            ProviderBuilder::new().connect_ws(WsConnect::new(self.url.clone())),
        )
        .await
        .map_err(|_| ChainError::Timeout {
            what: format!("connect {}", self.url),
            after: self.connect_timeout,
        })?
        .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;

        let subscription = timeout(self.connect_timeout, provider.subscribe_blocks())
            .await
            .map_err(|_| ChainError::Timeout {
                what: format!("subscribe {}", self.url),
                after: self.connect_timeout,
            })?
            .map_err(|e| ChainError::SubscriptionFailed(e.to_string()))?;

        info!("Subscribed to new blocks");

        // The provider owns the socket, so it travels with the stream state
        let headers = Box::pin(subscription.into_stream());
        let stream = stream::unfold((provider, headers), |(provider, mut headers)| async move {
            let header = headers.next().await?;
            Some((header.number, (provider, headers)))
        });

        Ok(stream.boxed())
    }
}
