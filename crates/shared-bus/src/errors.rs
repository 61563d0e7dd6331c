//! # Bus Errors
//!
//! Publish-time failures are returned to the caller. Everything after
//! persistence is logged only.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the event bus.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Payload could not be converted into a key-value mapping.
    #[error("Invalid event payload: {0}")]
    Validation(String),

    /// The durable event store rejected or could not take the write.
    #[error("Failed to persist event: {0}")]
    Persistence(String),

    /// The shared channel could not be reached.
    #[error("Failed to broadcast event: {0}")]
    Broadcast(String),

    /// No event with this id in the durable store.
    #[error("Event not found: {0}")]
    NotFound(Uuid),

    /// The bus was shut down.
    #[error("Event bus closed")]
    Closed,
}

/// Outcome of a failed handler invocation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Business-logic failure reported by the handler.
    #[error("Handler failed: {0}")]
    Failed(String),

    /// The handler panicked; caught at the dispatch boundary.
    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Shorthand for [`HandlerError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = BusError::Validation("expected object".to_string());
        assert!(err.to_string().contains("expected object"));
    }

    #[test]
    fn test_not_found_error() {
        let id = Uuid::new_v4();
        assert!(BusError::NotFound(id).to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_handler_error_shorthand() {
        assert_eq!(
            HandlerError::failed("smtp down"),
            HandlerError::Failed("smtp down".to_string())
        );
    }
}
