//! # Event Listener
//!
//! Receives envelopes from other processes on the shared channel and hands
//! them to the local dispatch step.

use crate::dispatcher::DispatchPath;
use crate::errors::BusError;
use crate::events::BusEnvelope;
use crate::publisher::EventBus;
use bl_telemetry::metrics::LISTENER_DROPPED;
use shared_store::{ChannelSubscription, StoreError};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Long-running receiver for one bus instance.
pub struct EventListener {
    bus: Arc<EventBus>,
}

impl EventListener {
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    /// Subscribe to the shared channel and spawn the receive loop.
    ///
    /// The subscription is in place when this returns, so every broadcast
    /// from then on is seen. The loop exits when `shutdown` changes or its
    /// sender is dropped.
    ///
    /// # Errors
    ///
    /// `BusError::Broadcast` if the initial subscription fails.
    pub async fn start(
        self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>, BusError> {
        let subscription = self.subscribe().await?;
        info!(
            channel = %self.bus.config().channel,
            origin = %self.bus.origin(),
            "Event listener started"
        );
        Ok(tokio::spawn(self.run(subscription, shutdown)))
    }

    async fn subscribe(&self) -> Result<ChannelSubscription, BusError> {
        self.bus
            .shared_store()
            .subscribe(&self.bus.config().channel)
            .await
            .map_err(|e| BusError::Broadcast(e.to_string()))
    }

    async fn run(self, mut subscription: ChannelSubscription, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }
        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                received = subscription.recv() => received,
            };

            match received {
                Ok(raw) => {
                    if let Err(BusError::Closed) = self.handle_message(&raw).await {
                        debug!("Bus closed, listener exiting");
                        break;
                    }
                }
                Err(StoreError::Lagged(missed)) => {
                    warn!(missed, "Listener lagged, broadcasts were dropped");
                }
                Err(e) => {
                    warn!(error = %e, "Channel receive failed, re-subscribing");
                    drop(subscription);
                    match self.resubscribe(&mut shutdown).await {
                        Some(fresh) => subscription = fresh,
                        None => break,
                    }
                }
            }
        }
        info!(origin = %self.bus.origin(), "Event listener stopped");
    }

    /// Retry the subscription after the configured backoff until it works
    /// or shutdown is signalled.
    async fn resubscribe(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<ChannelSubscription> {
        let backoff = self.bus.config().listener_backoff;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => return None,
                () = tokio::time::sleep(backoff) => {}
            }
            match self.subscribe().await {
                Ok(subscription) => {
                    info!("Listener re-subscribed");
                    return Some(subscription);
                }
                Err(e) => warn!(error = %e, ?backoff, "Re-subscribe failed"),
            }
        }
    }

    async fn handle_message(&self, raw: &str) -> Result<(), BusError> {
        let envelope = match BusEnvelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                LISTENER_DROPPED.inc();
                warn!(error = %e, "Dropping undecodable channel message");
                return Ok(());
            }
        };

        if envelope.origin == self.bus.origin() {
            return Ok(());
        }

        match self.bus.dispatch(&envelope.event, DispatchPath::Remote).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(
                    event_id = %envelope.event.id,
                    event_type = %envelope.event.event_type,
                    error = %e,
                    "Remote dispatch failed"
                );
                Err(e)
            }
        }
    }
}
