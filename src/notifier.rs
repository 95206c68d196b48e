//! Discovery Notifications
//!
//! One outbound message per admitted contract. Delivery is best effort: the
//! caller logs a failure and moves on, the admission stands.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::registry::ContractEntry;

/// Errors that can occur while delivering a notification
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Destination rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },
}

/// Message body: address on the first line, selector on the second
pub fn format_message(entry: &ContractEntry) -> String {
    format!("{}\n{}", entry.address_hex(), entry.method_label())
}

/// Delivers discovery messages to one destination
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, entry: &ContractEntry) -> Result<(), NotifyError>;
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
}

/// Posts messages to a chat bot API (`{api_url}/sendMessage`)
#[derive(Debug, Clone)]
pub struct ChatNotifier {
    client: reqwest::Client,
    api_url: String,
    chat_id: String,
}

impl ChatNotifier {
    pub fn new(
        api_url: impl Into<String>,
        chat_id: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            chat_id: chat_id.into(),
        })
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }
}

#[async_trait]
impl Notifier for ChatNotifier {
    async fn notify(&self, entry: &ContractEntry) -> Result<(), NotifyError> {
        let body = SendMessage {
            chat_id: &self.chat_id,
            text: format_message(entry),
        };

        let response = self
            .client
            .post(format!("{}/sendMessage", self.api_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Writes messages to the log when no external destination is configured
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, entry: &ContractEntry) -> Result<(), NotifyError> {
        info!(
            address = %entry.address_hex(),
            method = %entry.method_label(),
            "New contract discovered"
        );
        Ok(())
    }
}
