//! Chain Listener
//!
//! Follows new blocks, derives the deployed address for every transaction whose
//! selector is allowed, and hands the result to the admission pipeline.
//!
//! A dropped or silent subscription is reconnected with exponential backoff.
//! The attempt counter resets whenever a block arrives; running out of attempts ends the
//! listener with [`ChainError::MaxReconnectAttemptsExceeded`].

use std::sync::Arc;

use alloy::primitives::TxHash;
use futures::StreamExt;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chain::{ChainClient, ChainError};
use crate::filter::MethodFilter;
use crate::pipeline::Pipeline;
use crate::registry::{Candidate, CandidateSource};
use crate::subscription::{BlockFeed, ReconnectPolicy};

/// How long a subscription may go without a block before it is treated as dead
pub const DEFAULT_BLOCK_IDLE_TIMEOUT_SECS: u64 = 60;

/// What happened while processing one block
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BlockReport {
    /// False if the node didn't return the block
    pub found: bool,
    pub transactions: usize,
    pub candidates: usize,
    pub admitted: usize,
}

pub struct ChainListener {
    feed: Arc<dyn BlockFeed>,
    chain: Arc<dyn ChainClient>,
    filter: Arc<MethodFilter>,
    pipeline: Arc<Pipeline>,
    policy: ReconnectPolicy,
    idle_timeout: Duration,
    shutdown: CancellationToken,
}

impl ChainListener {
    pub fn new(
        feed: Arc<dyn BlockFeed>,
        chain: Arc<dyn ChainClient>,
        filter: Arc<MethodFilter>,
        pipeline: Arc<Pipeline>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            feed,
            chain,
            filter,
            pipeline,
            policy: ReconnectPolicy::default(),
            idle_timeout: Duration::from_secs(DEFAULT_BLOCK_IDLE_TIMEOUT_SECS),
            shutdown,
        }
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// A silent subscription is dropped and resubscribed after `idle_timeout`
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Subscribe and process blocks until shutdown or until reconnection gives up
    pub async fn run(&self) -> Result<(), ChainError> {
        let mut attempts: u32 = 0;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            match self.feed.subscribe().await {
                Ok(mut blocks) => loop {
                    let next = tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            info!("Chain listener stopping");
                            return Ok(());
                        }
                        next = timeout(self.idle_timeout, blocks.next()) => next,
                    };

                    match next {
                        Ok(Some(number)) => {
                            attempts = 0;
                            self.process_block(number).await;
                        }
                        Ok(None) => {
                            warn!("Block subscription ended");
                            break;
                        }
                        Err(_) => {
                            warn!(idle = ?self.idle_timeout, "No new block within idle timeout, resubscribing");
                            break;
                        }
                    }
                },
                Err(e) => {
                    error!(error = %e, "Failed to subscribe to new blocks");
                }
            }

            if attempts >= self.policy.max_attempts {
                error!(attempts, "Giving up on block subscription");
                return Err(ChainError::MaxReconnectAttemptsExceeded(self.policy.max_attempts));
            }

            let delay = self.policy.backoff_delay(attempts);
            attempts += 1;
            warn!(
                "Reconnecting block subscription (attempt {}/{}), waiting {:?}",
                attempts, self.policy.max_attempts, delay
            );

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        info!("Chain listener stopping");
        Ok(())
    }

    /// Inspect every transaction in block `number`.
    ///
    /// Fetch failures are logged and skipped; nothing here is fatal.
    pub async fn process_block(&self, number: u64) -> BlockReport {
        // Selectors may change between blocks
        self.filter.reload();

        let mut report = BlockReport::default();

        let hashes = match self.chain.block_transaction_hashes(number).await {
            Ok(Some(hashes)) => hashes,
            Ok(None) => {
                debug!(block = number, "Block not available yet, skipping");
                return report;
            }
            Err(e) => {
                warn!(block = number, error = %e, "Failed to fetch block");
                return report;
            }
        };

        report.found = true;
        report.transactions = hashes.len();

        for hash in hashes {
            if self.shutdown.is_cancelled() {
                break;
            }

            let Some(candidate) = self.inspect_transaction(hash).await else {
                continue;
            };
            report.candidates += 1;

            match self.pipeline.submit(candidate).await {
                Ok(admission) if admission.is_admitted() => report.admitted += 1,
                Ok(_) => {}
                Err(e) => {
                    error!(block = number, tx = %hash, error = %e, "Failed to record contract");
                }
            }
        }

        debug!(
            block = number,
            transactions = report.transactions,
            candidates = report.candidates,
            admitted = report.admitted,
            "Processed block"
        );
        report
    }

    /// Build a candidate from one contract creation if its selector is allowed
    pub async fn inspect_transaction(&self, hash: TxHash) -> Option<Candidate> {
        let tx = match self.chain.transaction(hash).await {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                debug!(tx = %hash, "Transaction not found, skipping");
                return None;
            }
            Err(e) => {
                warn!(tx = %hash, error = %e, "Failed to fetch transaction");
                return None;
            }
        };

        // A call deploys nothing, whatever its calldata starts with
        if !tx.is_creation() {
            return None;
        }

        // Inputs shorter than 4 bytes never match
        let selector = tx.selector()?;
        if !self.filter.accepts(&selector) {
            return None;
        }

        Some(Candidate {
            address: tx.created_address(),
            method: Some(selector),
            source_tx: tx.hash,
            source: CandidateSource::Chain,
        })
    }
}
