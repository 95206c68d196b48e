//! Runtime configuration, read once from the environment at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Selector;
use thiserror::Error;

use crate::chain::DEFAULT_FETCH_TIMEOUT_MS;
use crate::filter::{parse_selector_list, FileSelectorSource, SelectorSource, StaticSelectorSource};
use crate::listener::DEFAULT_BLOCK_IDLE_TIMEOUT_SECS;
use crate::poller::{UnknownMethodPolicy, DEFAULT_POLL_INTERVAL_SECS};
use crate::publisher::DEFAULT_CHANNEL;
use crate::registry::RegistryFiles;
use crate::subscription::{ReconnectPolicy, INITIAL_BACKOFF_MS, MAX_BACKOFF_MS, MAX_RECONNECT_ATTEMPTS};

pub const DEFAULT_REGISTRY_PATH: &str = "contracts.json";
pub const DEFAULT_MIRROR_PATH: &str = "contracts.txt";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnv(String),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Where the allowed-method set comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodSource {
    /// Re-read before every block and poll cycle
    File(PathBuf),
    Fixed(Vec<Selector>),
}

impl MethodSource {
    pub fn selector_source(&self) -> Box<dyn SelectorSource> {
        match self {
            MethodSource::File(path) => Box::new(FileSelectorSource::new(path.clone())),
            MethodSource::Fixed(selectors) => Box::new(StaticSelectorSource::new(selectors.clone())),
        }
    }
}

/// Notification destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyTarget {
    Chat { api_url: String, chat_id: String },
    Redis { url: String, channel: String },
    Log,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub ws_url: String,
    pub rpc_url: String,
    pub index_api_url: String,
    pub allowed_methods: MethodSource,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub excluded_labels: Vec<String>,
    pub registry: RegistryFiles,
    pub unknown_method_policy: UnknownMethodPolicy,
    pub reconnect: ReconnectPolicy,
    /// A subscription silent for this long is dropped and resubscribed
    pub block_idle_timeout: Duration,
    pub notify: NotifyTarget,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let require = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnv(key.to_string()));

        let allowed_methods = match (get("ALLOWED_METHODS_FILE"), get("ALLOWED_METHODS")) {
            (Some(path), _) => MethodSource::File(PathBuf::from(expand_path(&path))),
            (None, Some(list)) => {
                let selectors = parse_selector_list(&list).map_err(|e| invalid("ALLOWED_METHODS", e))?;
                MethodSource::Fixed(selectors)
            }
            (None, None) => return Err(ConfigError::MissingEnv("ALLOWED_METHODS_FILE".to_string())),
        };

        let notify = match (get("NOTIFY_API_URL"), get("NOTIFY_CHAT_ID"), get("REDIS_URL")) {
            (Some(api_url), Some(chat_id), _) => NotifyTarget::Chat { api_url, chat_id },
            (Some(_), None, _) => return Err(ConfigError::MissingEnv("NOTIFY_CHAT_ID".to_string())),
            (None, Some(_), _) => return Err(ConfigError::MissingEnv("NOTIFY_API_URL".to_string())),
            (None, None, Some(url)) => NotifyTarget::Redis {
                url,
                channel: get("REDIS_CHANNEL").unwrap_or_else(|| DEFAULT_CHANNEL.to_string()),
            },
            (None, None, None) => NotifyTarget::Log,
        };

        let registry = RegistryFiles::new(
            expand_path(&get("REGISTRY_PATH").unwrap_or_else(|| DEFAULT_REGISTRY_PATH.to_string())),
            expand_path(&get("REGISTRY_MIRROR_PATH").unwrap_or_else(|| DEFAULT_MIRROR_PATH.to_string())),
        );

        let reconnect = ReconnectPolicy {
            max_attempts: parse_or("RECONNECT_MAX_ATTEMPTS", get("RECONNECT_MAX_ATTEMPTS"), MAX_RECONNECT_ATTEMPTS)?,
            initial_backoff_ms: parse_or(
                "RECONNECT_INITIAL_BACKOFF_MS",
                get("RECONNECT_INITIAL_BACKOFF_MS"),
                INITIAL_BACKOFF_MS,
            )?,
            max_backoff_ms: parse_or("RECONNECT_MAX_BACKOFF_MS", get("RECONNECT_MAX_BACKOFF_MS"), MAX_BACKOFF_MS)?,
        };

        let poll_secs: u64 = parse_or("POLL_INTERVAL_SECS", get("POLL_INTERVAL_SECS"), DEFAULT_POLL_INTERVAL_SECS)?;
        if poll_secs == 0 {
            return Err(invalid("POLL_INTERVAL_SECS", "must be at least 1"));
        }
        let timeout_ms: u64 = parse_or("FETCH_TIMEOUT_MS", get("FETCH_TIMEOUT_MS"), DEFAULT_FETCH_TIMEOUT_MS)?;
        if timeout_ms == 0 {
            return Err(invalid("FETCH_TIMEOUT_MS", "must be at least 1"));
        }

        let idle_secs: u64 = parse_or(
            "BLOCK_IDLE_TIMEOUT_SECS",
            get("BLOCK_IDLE_TIMEOUT_SECS"),
            DEFAULT_BLOCK_IDLE_TIMEOUT_SECS,
        )?;
        if idle_secs == 0 {
            return Err(invalid("BLOCK_IDLE_TIMEOUT_SECS", "must be at least 1"));
        }

        Ok(Self {
            ws_url: require("WS_URL")?,
            rpc_url: require("RPC_URL")?,
            index_api_url: require("INDEX_API_URL")?,
            allowed_methods,
            poll_interval: Duration::from_secs(poll_secs),
            fetch_timeout: Duration::from_millis(timeout_ms),
            excluded_labels: get("EXCLUDED_LABELS")
                .map(|labels| split_list(&labels))
                .unwrap_or_default(),
            registry,
            unknown_method_policy: parse_or(
                "UNKNOWN_METHOD_POLICY",
                get("UNKNOWN_METHOD_POLICY"),
                UnknownMethodPolicy::default(),
            )?,
            reconnect,
            block_idle_timeout: Duration::from_secs(idle_secs),
            notify,
            logging: LoggingConfig {
                level: get("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
                json: parse_or("LOG_JSON", get("LOG_JSON"), false)?,
            },
        })
    }
}

fn invalid(key: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    match raw {
        Some(raw) => raw.parse().map_err(|e: T::Err| invalid(key, e)),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Expand ~ to home directory in path
pub fn expand_path(path: &str) -> String {
    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
