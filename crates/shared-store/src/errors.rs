//! Store error types.

use thiserror::Error;

/// Errors surfaced by a [`crate::SharedStore`] implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store cannot be reached.
    #[error("Shared store unavailable: {0}")]
    Unavailable(String),

    /// Operation against a key holding the wrong kind of value.
    #[error("Key {key} holds a value of the wrong type")]
    WrongType { key: String },

    /// `incr` on a value that is not an integer.
    #[error("Value at {key} is not an integer")]
    NotInteger { key: String },

    /// The subscription fell behind and messages were skipped.
    #[error("Channel subscriber lagged, {0} messages skipped")]
    Lagged(u64),

    /// The channel was closed.
    #[error("Channel closed")]
    ChannelClosed,
}
