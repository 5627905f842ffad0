//! Timeline provider configuration.
//!
//! Loaded from RON so the replay harness and embedding apps share a format:
//!
//! ```ron
//! (
//!     change_capacity: 512,
//!     log_item_identifiers: true,
//! )
//! ```
//!
//! Omitted fields take their defaults from [`crate::constants`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CHANGE_CAPACITY, DEFAULT_LOG_ITEM_IDENTIFIERS, DEFAULT_YIELD_BETWEEN_BATCHES,
};

/// Tunables for one [`TimelineProvider`](crate::TimelineProvider).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Capacity of the change broadcast (minimum 1).
    pub change_capacity: usize,
    /// Trace-log item identifiers for every diff.
    pub log_item_identifiers: bool,
    /// Yield to the runtime between batches.
    pub yield_between_batches: bool,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            change_capacity: DEFAULT_CHANGE_CAPACITY,
            log_item_identifiers: DEFAULT_LOG_ITEM_IDENTIFIERS,
            yield_between_batches: DEFAULT_YIELD_BETWEEN_BATCHES,
        }
    }
}

impl TimelineConfig {
    /// Parse from RON text.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: TimelineConfig = ron::from_str(text)?;
        config.validate()
    }

    /// Read and parse a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.change_capacity == 0 {
            return Err(ConfigError::Invalid("change_capacity must be at least 1".into()));
        }
        Ok(self)
    }
}

/// Errors from loading a [`TimelineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}
