//! # Channel Subscription
//!
//! Receiving side of a pub/sub channel.

use crate::errors::StoreError;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::debug;

/// A subscription handle for one channel.
///
/// Dropping the handle unsubscribes.
pub struct ChannelSubscription {
    channel: String,
    receiver: broadcast::Receiver<String>,
    forwarder: Option<AbortHandle>,
}

impl ChannelSubscription {
    pub fn new(channel: impl Into<String>, receiver: broadcast::Receiver<String>) -> Self {
        Self {
            channel: channel.into(),
            receiver,
            forwarder: None,
        }
    }

    /// A subscription fed by a background task. The task is aborted when the
    /// handle is dropped.
    pub fn with_forwarder(
        channel: impl Into<String>,
        receiver: broadcast::Receiver<String>,
        forwarder: AbortHandle,
    ) -> Self {
        Self {
            channel: channel.into(),
            receiver,
            forwarder: Some(forwarder),
        }
    }

    /// Block until the next message arrives.
    ///
    /// # Errors
    ///
    /// - `StoreError::Lagged` - messages were dropped; the subscription is
    ///   still usable and the next call resumes with the oldest retained one
    /// - `StoreError::ChannelClosed` - the store went away
    pub async fn recv(&mut self) -> Result<String, StoreError> {
        match self.receiver.recv().await {
            Ok(message) => Ok(message),
            Err(broadcast::error::RecvError::Lagged(count)) => {
                debug!(channel = %self.channel, lagged = count, "Subscriber lagged");
                Err(StoreError::Lagged(count))
            }
            Err(broadcast::error::RecvError::Closed) => Err(StoreError::ChannelClosed),
        }
    }

    /// Non-blocking receive. `Ok(None)` when nothing is queued.
    pub fn try_recv(&mut self) -> Result<Option<String>, StoreError> {
        match self.receiver.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Lagged(count)) => Err(StoreError::Lagged(count)),
            Err(broadcast::error::TryRecvError::Closed) => Err(StoreError::ChannelClosed),
        }
    }

    /// Channel name.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Drop for ChannelSubscription {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        debug!(channel = %self.channel, "Subscription dropped");
    }
}
