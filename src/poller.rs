//! API Poller
//!
//! Periodically fetches creation events from an external index API as a
//! completeness backstop for the chain listener. Each record's selector is
//! resolved by looking up its creation transaction on the node.
//!
//! Failures are classified (rate-limited, HTTP error, no response, malformed
//! body, processing error), logged, and never stop the timer. A rate-limit
//! response puts the poller into a cool-down during which ticks are skipped.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Selector, TxHash};
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chain::ChainClient;
use crate::decoder::{hex_to_bytes, parse_address};
use crate::filter::MethodFilter;
use crate::pipeline::Pipeline;
use crate::registry::{Candidate, CandidateSource};

/// Default poll period
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Upper bound on the rate-limit cool-down
pub const MAX_RATE_LIMIT_BACKOFF_SECS: u64 = 60;

/// Errors from a single poll cycle
#[derive(Error, Debug)]
pub enum PollError {
    #[error("Rate limited by index API (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Index API returned HTTP {status}")]
    Http { status: u16 },

    #[error("No response from index API: {0}")]
    NoResponse(#[from] reqwest::Error),

    #[error("Malformed index API response: {0}")]
    Malformed(String),

    #[error("Failed to process index records: {0}")]
    Processing(String),
}

/// What to do with a record whose creation transaction can't be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownMethodPolicy {
    /// Discard it: an unresolved selector can't pass the allowed-method filter
    #[default]
    Reject,
    /// Admit it with the unknown placeholder
    Admit,
}

impl FromStr for UnknownMethodPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(UnknownMethodPolicy::Reject),
            "admit" => Ok(UnknownMethodPolicy::Admit),
            other => Err(format!("expected 'reject' or 'admit', got '{other}'")),
        }
    }
}

/// A creation event as reported by the index API
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IndexRecord {
    #[serde(default, alias = "contractAddress", alias = "contract_address")]
    pub address: Option<String>,
    #[serde(default, alias = "txHash", alias = "transactionHash", alias = "creationTx")]
    pub tx_hash: Option<String>,
    #[serde(default, alias = "type", alias = "labels")]
    pub label: Option<String>,
}

/// Top-level body: either a bare array or an array under a well-known key
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IndexResponse {
    Records(Vec<IndexRecord>),
    Wrapped {
        #[serde(alias = "result", alias = "items", alias = "results")]
        data: Vec<IndexRecord>,
    },
}

impl IndexResponse {
    fn into_records(self) -> Vec<IndexRecord> {
        match self {
            IndexResponse::Records(records) | IndexResponse::Wrapped { data: records } => records,
        }
    }
}

/// Parse an index API body into records
pub fn parse_index_body(body: &[u8]) -> Result<Vec<IndexRecord>, PollError> {
    serde_json::from_slice::<IndexResponse>(body)
        .map(IndexResponse::into_records)
        .map_err(|e| PollError::Malformed(e.to_string()))
}

/// Counters for one poll cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub fetched: usize,
    /// No address, or an excluded label
    pub discarded: usize,
    /// Already in the registry before resolution
    pub known: usize,
    /// Selector resolved but not allowed, or unresolved under `Reject`
    pub filtered: usize,
    pub admitted: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// Cool-down state after rate-limit responses
#[derive(Debug, Clone)]
pub struct RateLimitBackoff {
    base: Duration,
    max: Duration,
    current: Option<Duration>,
    until: Option<Instant>,
}

impl RateLimitBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: None,
            until: None,
        }
    }

    /// Start or extend the cool-down and return its length.
    ///
    /// Honours `retry_after` when given, otherwise doubles the previous wait.
    pub fn engage(&mut self, now: Instant, retry_after: Option<Duration>) -> Duration {
        let wait = match (retry_after, self.current) {
            (Some(retry_after), _) => retry_after,
            (None, Some(previous)) => previous.saturating_mul(2),
            (None, None) => self.base,
        }
        .min(self.max);

        self.current = Some(wait);
        self.until = Some(now + wait);
        wait
    }

    pub fn is_cooling(&self, now: Instant) -> bool {
        self.until.is_some_and(|until| now < until)
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.until = None;
    }
}

pub struct ApiPoller {
    http: reqwest::Client,
    url: String,
    interval: Duration,
    excluded_labels: HashSet<String>,
    unknown_policy: UnknownMethodPolicy,
    chain: Arc<dyn ChainClient>,
    filter: Arc<MethodFilter>,
    pipeline: Arc<Pipeline>,
    shutdown: CancellationToken,
}

impl ApiPoller {
    pub fn new(
        url: impl Into<String>,
        request_timeout: Duration,
        chain: Arc<dyn ChainClient>,
        filter: Arc<MethodFilter>,
        pipeline: Arc<Pipeline>,
        shutdown: CancellationToken,
    ) -> Result<Self, PollError> {
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            excluded_labels: HashSet::new(),
            unknown_policy: UnknownMethodPolicy::default(),
            chain,
            filter,
            pipeline,
            shutdown,
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Labels (case-insensitive) whose records are discarded
    pub fn with_excluded_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.excluded_labels = labels
            .into_iter()
            .map(|label| label.as_ref().trim().to_lowercase())
            .filter(|label| !label.is_empty())
            .collect();
        self
    }

    pub fn with_unknown_method_policy(mut self, policy: UnknownMethodPolicy) -> Self {
        self.unknown_policy = policy;
        self
    }

    /// Poll on a fixed timer until shutdown
    pub async fn run(&self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut backoff = RateLimitBackoff::new(
            self.interval,
            Duration::from_secs(MAX_RATE_LIMIT_BACKOFF_SECS),
        );

        info!(url = %self.url, interval = ?self.interval, "API poller started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if backoff.is_cooling(Instant::now()) {
                debug!("Skipping poll during rate-limit cool-down");
                continue;
            }

            match self.poll_once().await {
                Ok(report) => {
                    backoff.clear();
                    debug!(?report, "Poll complete");
                }
                Err(PollError::RateLimited { retry_after }) => {
                    let wait = backoff.engage(Instant::now(), retry_after);
                    warn!(cooldown = ?wait, "Index API rate limit hit, backing off");
                }
                Err(e @ PollError::Processing(_)) => error!(error = %e, "Poll failed"),
                Err(e) => warn!(error = %e, "Poll failed"),
            }
        }

        info!("API poller stopping");
    }

    /// Run one poll cycle
    pub async fn poll_once(&self) -> Result<PollReport, PollError> {
        self.filter.reload();

        let records = self.fetch_records().await?;
        let mut report = PollReport {
            fetched: records.len(),
            ..Default::default()
        };

        for record in records {
            if self.shutdown.is_cancelled() {
                break;
            }

            let Some(address) = self.target_address(&record) else {
                report.discarded += 1;
                continue;
            };

            if self.pipeline.registry().contains(&address).await {
                report.known += 1;
                continue;
            }

            let method = self.resolve_method(record.tx_hash.as_deref()).await;
            let allowed = match method {
                Some(selector) => self.filter.accepts(&selector),
                None => self.unknown_policy == UnknownMethodPolicy::Admit,
            };
            if !allowed {
                debug!(address = %address, method = ?method, "Record filtered out");
                report.filtered += 1;
                continue;
            }

            let candidate = Candidate {
                address,
                method,
                source_tx: record
                    .tx_hash
                    .as_deref()
                    .and_then(parse_tx_hash)
                    .unwrap_or_default(),
                source: CandidateSource::Api,
            };

            match self.pipeline.submit(candidate).await {
                Ok(admission) if admission.is_admitted() => report.admitted += 1,
                Ok(_) => report.duplicates += 1,
                Err(e) => {
                    error!(address = %address, error = %e, "Failed to record contract");
                    report.failed += 1;
                }
            }
        }

        if report.failed > 0 {
            return Err(PollError::Processing(format!(
                "{} of {} records could not be recorded",
                report.failed, report.fetched
            )));
        }

        Ok(report)
    }

    async fn fetch_records(&self) -> Result<Vec<IndexRecord>, PollError> {
        let response = self.http.get(&self.url).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(PollError::RateLimited { retry_after });
        }

        if !status.is_success() {
            return Err(PollError::Http {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        parse_index_body(&body)
    }

    /// The record's address, unless it is missing or carries an excluded label
    fn target_address(&self, record: &IndexRecord) -> Option<Address> {
        let raw = record.address.as_deref().map(str::trim).filter(|raw| !raw.is_empty())?;

        if let Some(label) = &record.label {
            if self.excluded_labels.contains(&label.trim().to_lowercase()) {
                debug!(address = raw, label = %label, "Discarding excluded record");
                return None;
            }
        }

        match parse_address(raw) {
            Ok(address) => Some(address),
            Err(e) => {
                warn!(address = raw, error = %e, "Discarding record with invalid address");
                None
            }
        }
    }

    /// Selector of the creation transaction; `None` if it can't be resolved
    async fn resolve_method(&self, tx_hash: Option<&str>) -> Option<Selector> {
        let Some(hash) = tx_hash.and_then(parse_tx_hash) else {
            debug!(tx = ?tx_hash, "Record has no usable creation transaction");
            return None;
        };

        match self.chain.transaction(hash).await {
            Ok(Some(tx)) => tx.selector(),
            Ok(None) => {
                debug!(tx = %hash, "Creation transaction not found");
                None
            }
            Err(e) => {
                warn!(tx = %hash, error = %e, "Failed to resolve creation transaction");
                None
            }
        }
    }
}

fn parse_tx_hash(raw: &str) -> Option<TxHash> {
    let bytes = hex_to_bytes(raw.trim()).ok()?;
    (bytes.len() == 32).then(|| TxHash::from_slice(&bytes))
}
