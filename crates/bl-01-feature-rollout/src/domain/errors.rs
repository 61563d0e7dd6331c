//! # Domain Errors
//!
//! Error types for the rollout engine.

use chrono::{DateTime, Utc};
use shared_store::StoreError;
use thiserror::Error;

/// Rollout error types.
#[derive(Debug, Error)]
pub enum RolloutError {
    /// Experiment window is empty or inverted.
    #[error("Invalid experiment window: start {start} is not before end {end}")]
    InvalidWindow {
        /// Requested start
        start: DateTime<Utc>,
        /// Requested end
        end: DateTime<Utc>,
    },

    /// Name or feature key missing.
    #[error("Invalid experiment definition: {0}")]
    InvalidDefinition(String),

    /// No experiment under this feature key.
    #[error("Experiment not found: {0}")]
    NotFound(String),

    /// Stored definition could not be parsed.
    #[error("Corrupt experiment definition for {feature_key}: {reason}")]
    Corrupt {
        /// Hash field holding the definition
        feature_key: String,
        /// Parse failure
        reason: String,
    },

    /// User directory lookup failed.
    #[error("User directory error: {0}")]
    Directory(String),

    /// Shared store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}
