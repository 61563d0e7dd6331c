//! # Adapters
//!
//! Implementations of the runtime's outbound ports.

pub mod notifier;

pub use notifier::{
    LoggingNotifier, Notification, NotificationField, Notifier, NotifyError, RecordingNotifier,
};
