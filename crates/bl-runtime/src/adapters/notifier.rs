//! # Notifier Adapters
//!
//! Downstream message sink used by the bus handlers. Production deployments
//! plug in a chat webhook; this crate ships a logging sink and a recording
//! sink for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// A rendered message ready for a chat channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    /// RGB accent color.
    pub color: u32,
    pub fields: Vec<NotificationField>,
}

/// Name/value line inside a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationField {
    pub name: String,
    pub value: String,
}

/// Notifier failures.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification rejected: {0}")]
    Rejected(String),
}

/// Downstream message sink - outbound port.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log.
#[derive(Debug, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let rendered = serde_json::to_string(notification)
            .map_err(|e| NotifyError::Rejected(e.to_string()))?;
        info!(title = %notification.title, color = notification.color, notification = %rendered, "Notification");
        Ok(())
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}
