//! Deploywatch Library
//!
//! This crate watches a chain for newly deployed contracts whose creation
//! transaction calls an allowed method, records each one exactly once, and
//! sends a notification per discovery.

pub mod chain;
pub mod config;
pub mod decoder;
pub mod filter;
pub mod listener;
pub mod notifier;
pub mod pipeline;
pub mod poller;
pub mod publisher;
pub mod registry;
pub mod subscription;

// Re-export commonly used types
pub use chain::{ChainClient, ChainError};
pub use config::{Config, ConfigError};
pub use decoder::{contract_address, ChainTransaction};
pub use filter::{extract_selector, MethodFilter, SelectorSource};
pub use listener::ChainListener;
pub use notifier::{format_message, Notifier, NotifyError};
pub use pipeline::Pipeline;
pub use poller::{ApiPoller, PollError, UnknownMethodPolicy};
pub use registry::{Admission, Candidate, CandidateSource, ContractEntry, Registry, RegistryError, RegistryFiles};
pub use subscription::{BlockFeed, ReconnectPolicy, WsBlockFeed};
