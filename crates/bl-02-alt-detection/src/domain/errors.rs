//! # Domain Errors
//!
//! Error types for the alt-account detector.

use shared_bus::BusError;
use shared_store::StoreError;
use shared_types::UserId;
use thiserror::Error;

/// Detection error types.
#[derive(Debug, Error)]
pub enum DetectionError {
    /// The subject account is not in the directory.
    #[error("Unknown user: {0}")]
    UnknownUser(UserId),

    /// Account directory lookup failed.
    #[error("Account directory error: {0}")]
    Directory(String),

    /// Shared store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The detection could not be published.
    #[error(transparent)]
    Publish(#[from] BusError),
}
