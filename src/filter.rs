//! Allowed-Method Filtering
//!
//! Holds the set of 4-byte method selectors a creation transaction must invoke
//! to be of interest. The set comes from an external source and can be
//! reloaded at any point without restarting ingestion.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::RwLock;

use alloy::primitives::Selector;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while loading the allowed-method set
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Failed to read selector file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid method selector: {0}")]
    InvalidSelector(String),
}

/// Extract the method selector from transaction input data
///
/// # Arguments
/// * `input` - The full transaction input/calldata
///
/// # Returns
/// `Some(Selector)` if input has at least 4 bytes, `None` otherwise
pub fn extract_selector(input: &[u8]) -> Option<Selector> {
    if input.len() < 4 {
        return None;
    }
    Some(Selector::from_slice(&input[..4]))
}

/// Parse a selector from hex, with or without the 0x prefix
pub fn parse_selector(raw: &str) -> Result<Selector, FilterError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.len() != 8 {
        return Err(FilterError::InvalidSelector(raw.to_string()));
    }

    let bytes = hex::decode(digits).map_err(|_| FilterError::InvalidSelector(raw.to_string()))?;
    Ok(Selector::from_slice(&bytes))
}

/// Parse a list of selectors separated by commas and/or newlines.
///
/// Blank entries are skipped and anything after `#` on a line is a comment.
pub fn parse_selector_list(text: &str) -> Result<Vec<Selector>, FilterError> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or_default())
        .flat_map(|line| line.split(','))
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_selector)
        .collect()
}

/// Where the allowed-method list lives
#[cfg_attr(test, automock)]
pub trait SelectorSource: Send + Sync {
    /// Read the configured selector list
    fn load(&self) -> Result<Vec<Selector>, FilterError>;
}

/// A fixed list, for deployments that don't need hot updates
#[derive(Debug, Clone, Default)]
pub struct StaticSelectorSource {
    selectors: Vec<Selector>,
}

impl StaticSelectorSource {
    pub fn new(selectors: Vec<Selector>) -> Self {
        Self { selectors }
    }
}

impl SelectorSource for StaticSelectorSource {
    fn load(&self) -> Result<Vec<Selector>, FilterError> {
        Ok(self.selectors.clone())
    }
}

/// Re-reads a selector file on every load, so edits apply on the next reload
#[derive(Debug, Clone)]
pub struct FileSelectorSource {
    path: PathBuf,
}

impl FileSelectorSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl SelectorSource for FileSelectorSource {
    fn load(&self) -> Result<Vec<Selector>, FilterError> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| FilterError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        parse_selector_list(&text)
    }
}

/// The current allowed-method set plus the source it is reloaded from
pub struct MethodFilter {
    source: Box<dyn SelectorSource>,
    allowed: RwLock<HashSet<Selector>>,
}

impl MethodFilter {
    /// Build a filter and perform the initial load.
    ///
    /// Unlike [`MethodFilter::reload`], a failure here is returned, since
    /// there is no previous snapshot to fall back on.
    pub fn load(source: Box<dyn SelectorSource>) -> Result<Self, FilterError> {
        let allowed: HashSet<Selector> = source.load()?.into_iter().collect();
        if allowed.is_empty() {
            warn!("Allowed-method list is empty, nothing will be admitted until it is populated");
        }
        Ok(Self {
            source,
            allowed: RwLock::new(allowed),
        })
    }

    /// Build a filter over a fixed set of selectors
    pub fn fixed(selectors: impl IntoIterator<Item = Selector>) -> Self {
        let selectors: Vec<Selector> = selectors.into_iter().collect();
        Self {
            allowed: RwLock::new(selectors.iter().copied().collect()),
            source: Box::new(StaticSelectorSource::new(selectors)),
        }
    }

    /// Re-read the configured list and return the set now in effect.
    ///
    /// A failed read leaves the previous set in place.
    pub fn reload(&self) -> HashSet<Selector> {
        match self.source.load() {
            Ok(selectors) => {
                let fresh: HashSet<Selector> = selectors.into_iter().collect();
                let mut guard = self.allowed.write().unwrap_or_else(|e| e.into_inner());
                if *guard != fresh {
                    debug!(count = fresh.len(), "Allowed-method set changed");
                }
                *guard = fresh.clone();
                fresh
            }
            Err(e) => {
                warn!(error = %e, "Failed to reload allowed methods, keeping previous set");
                self.snapshot()
            }
        }
    }

    /// Check whether a selector is currently allowed
    pub fn accepts(&self, selector: &Selector) -> bool {
        self.allowed
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(selector)
    }

    /// Returns the selector of `input` if it is currently allowed
    pub fn accepts_input(&self, input: &[u8]) -> Option<Selector> {
        extract_selector(input).filter(|selector| self.accepts(selector))
    }

    /// Copy of the set currently in effect
    pub fn snapshot(&self) -> HashSet<Selector> {
        self.allowed.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl std::fmt::Debug for MethodFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodFilter")
            .field("allowed", &self.snapshot())
            .finish_non_exhaustive()
    }
}
