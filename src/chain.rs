//! Chain Access
//!
//! Block and transaction lookups against a node, each bounded by a timeout so
//! a stalled node never holds up the caller.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::TxHash;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

use crate::decoder::ChainTransaction;

/// Default timeout for a single node request
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;

/// Errors from node access and the block subscription
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("Subscription stream ended")]
    SubscriptionEnded,

    #[error("Max reconnection attempts ({0}) exceeded")]
    MaxReconnectAttemptsExceeded(u32),
}

/// Read access to blocks and transactions.
///
/// `Ok(None)` means the node doesn't have the item yet, which is expected
/// right after a new-block notification and is not an error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Hashes of the transactions in block `number`
    async fn block_transaction_hashes(&self, number: u64)
        -> Result<Option<Vec<TxHash>>, ChainError>;

    /// A single transaction by hash
    async fn transaction(&self, hash: TxHash) -> Result<Option<ChainTransaction>, ChainError>;
}

/// `ChainClient` backed by an alloy provider
pub struct RpcChainClient<P> {
    provider: P,
    timeout: Duration,
}

impl<P> RpcChainClient<P>
where
    P: Provider,
{
    pub fn new(provider: P, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    async fn bounded<T, E, F>(&self, what: impl Into<String>, fut: F) -> Result<T, ChainError>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        match timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| ChainError::Provider(e.to_string())),
            Err(_) => Err(ChainError::Timeout {
                what: what.into(),
                after: self.timeout,
            }),
        }
    }
}

/// Connect an HTTP JSON-RPC client
pub fn connect_http(url: &str, fetch_timeout: Duration) -> Result<RpcChainClient<impl Provider>, ChainError> {
    let url: Url = url
        .parse()
        .map_err(|e| ChainError::InvalidUrl(format!("{url}: {e}")))?;
    let provider = ProviderBuilder::new().connect_http(url);
    Ok(RpcChainClient::new(provider, fetch_timeout))
}

#[async_trait]
impl<P> ChainClient for RpcChainClient<P>
where
    P: Provider + Send + Sync,
{
    async fn block_transaction_hashes(
        &self,
        number: u64,
    ) -> Result<Option<Vec<TxHash>>, ChainError> {
        let block = self
            .bounded(format!("block {number}"), async {
                self.provider
                    .get_block_by_number(BlockNumberOrTag::Number(number))
                    .await
            })
            .await?;

        Ok(block.map(|block| {
            let hashes: Vec<TxHash> = block.transactions.hashes().collect();
            debug!(block = number, tx_count = hashes.len(), "Fetched block");
            hashes
        }))
    }

    async fn transaction(&self, hash: TxHash) -> Result<Option<ChainTransaction>, ChainError> {
        let tx = self
            .bounded(format!("transaction {hash:#x}"), async {
                self.provider.get_transaction_by_hash(hash).await
            })
            .await?;

        Ok(tx.as_ref().map(ChainTransaction::from))
    }
}
