//! # Event Publisher
//!
//! Defines the publishing side of the event bus and the bus instance itself.

use crate::dispatcher::{DispatchJob, DispatchPath, DispatchPool, DispatchStats};
use crate::errors::BusError;
use crate::events::{to_payload, BusEnvelope, Event, EventType, Payload};
use crate::store::EventStore;
use crate::subscriber::{EventHandler, HandlerId, HandlerRegistry};
use crate::{
    DEFAULT_DISPATCH_WORKERS, DEFAULT_EVENT_CHANNEL, DEFAULT_LISTENER_BACKOFF_MS,
    DEFAULT_QUEUE_CAPACITY,
};
use async_trait::async_trait;
use bl_telemetry::metrics::{BROADCAST_FAILURES, EVENTS_DISPATCHED, EVENTS_PUBLISHED};
use chrono::Utc;
use serde::Serialize;
use shared_store::SharedStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Trait for publishing events to the bus.
///
/// Producers depend on this rather than on [`EventBus`] so they can be
/// tested against a recording double.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Persist, broadcast and locally dispatch one event.
    async fn publish_payload(
        &self,
        event_type: EventType,
        payload: Payload,
    ) -> Result<Event, BusError>;

    /// Get the total number of events published.
    fn events_published(&self) -> u64;
}

/// Bus tuning.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Shared channel name.
    pub channel: String,
    /// Concurrent handler invocations.
    pub dispatch_workers: usize,
    /// Jobs buffered before publish applies backpressure.
    pub queue_capacity: usize,
    /// Wait before the listener re-subscribes after a receive error.
    pub listener_backoff: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_EVENT_CHANNEL.to_string(),
            dispatch_workers: DEFAULT_DISPATCH_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            listener_backoff: Duration::from_millis(DEFAULT_LISTENER_BACKOFF_MS),
        }
    }
}

/// One bus instance per process.
///
/// Owns the handler registry and the dispatch pool. Cross-process delivery
/// goes through the shared store's pub/sub channel; see
/// [`EventListener`](crate::EventListener) for the receiving half.
pub struct EventBus {
    origin: Uuid,
    config: BusConfig,
    events: Arc<dyn EventStore>,
    store: Arc<dyn SharedStore>,
    registry: HandlerRegistry,
    pool: DispatchPool,
    events_published: AtomicU64,
}

impl EventBus {
    /// Create a bus. Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(
        events: Arc<dyn EventStore>,
        store: Arc<dyn SharedStore>,
        config: BusConfig,
    ) -> Self {
        let origin = Uuid::new_v4();
        let pool = DispatchPool::new(config.dispatch_workers, config.queue_capacity);
        info!(
            %origin,
            channel = %config.channel,
            workers = config.dispatch_workers,
            "Event bus created"
        );
        Self {
            origin,
            config,
            events,
            store,
            registry: HandlerRegistry::new(),
            pool,
            events_published: AtomicU64::new(0),
        }
    }

    /// Identifier stamped on every envelope this bus broadcasts.
    #[must_use]
    pub fn origin(&self) -> Uuid {
        self.origin
    }

    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub(crate) fn shared_store(&self) -> &Arc<dyn SharedStore> {
        &self.store
    }

    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Publish any value that serializes to a key-value mapping.
    ///
    /// # Errors
    ///
    /// - `BusError::Validation` - payload is not a mapping
    /// - `BusError::Persistence` - the durable write failed; nothing was
    ///   broadcast or dispatched
    /// - `BusError::Closed` - the bus was shut down
    pub async fn publish<P>(&self, event_type: EventType, payload: &P) -> Result<Event, BusError>
    where
        P: Serialize + ?Sized + Sync,
    {
        let payload = to_payload(payload)?;
        self.publish_payload(event_type, payload).await
    }

    /// Register a handler for one event type.
    pub fn subscribe(&self, event_type: EventType, handler: Arc<dyn EventHandler>) -> HandlerId {
        self.registry.register(event_type, handler)
    }

    /// Register the same handler for several event types.
    pub fn subscribe_many(
        &self,
        event_types: &[EventType],
        handler: Arc<dyn EventHandler>,
    ) -> Vec<HandlerId> {
        event_types
            .iter()
            .map(|event_type| self.registry.register(*event_type, Arc::clone(&handler)))
            .collect()
    }

    /// Remove a registration. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, event_type: EventType, id: HandlerId) -> bool {
        self.registry.unregister(event_type, id)
    }

    /// Queue every handler registered for the event's type.
    ///
    /// Returns the number of handlers queued. Does not wait for them.
    pub async fn dispatch(&self, event: &Event, path: DispatchPath) -> Result<usize, BusError> {
        let handlers = self.registry.handlers_for(event.event_type);
        if handlers.is_empty() {
            debug!(event_id = %event.id, event_type = %event.event_type, "No handlers registered");
            return Ok(0);
        }

        let count = handlers.len();
        let event = Arc::new(event.clone());
        for registration in handlers {
            self.pool
                .submit(DispatchJob {
                    event: Arc::clone(&event),
                    registration,
                    path,
                })
                .await?;
        }
        EVENTS_DISPATCHED.with_label_values(&[path.as_str()]).inc();
        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            path = path.as_str(),
            handlers = count,
            "Event dispatched"
        );
        Ok(count)
    }

    /// Flag an event as processed in the durable store.
    ///
    /// # Errors
    ///
    /// `BusError::NotFound` for an unknown id, `BusError::Persistence` if the
    /// store fails.
    pub async fn acknowledge(&self, event_id: Uuid) -> Result<Event, BusError> {
        self.events.mark_processed(event_id, Utc::now()).await
    }

    /// Re-dispatch up to `limit` unacknowledged events to local handlers.
    ///
    /// Returns the number of events re-dispatched.
    pub async fn replay_unprocessed(&self, limit: usize) -> Result<usize, BusError> {
        let pending = self.events.list_unprocessed(limit).await?;
        for event in &pending {
            self.dispatch(event, DispatchPath::Replay).await?;
        }
        if !pending.is_empty() {
            info!(count = pending.len(), "Replayed unprocessed events");
        }
        Ok(pending.len())
    }

    /// Resolve once every queued handler invocation has finished.
    pub async fn wait_idle(&self) {
        self.pool.wait_idle().await;
    }

    #[must_use]
    pub fn dispatch_stats(&self) -> DispatchStats {
        self.pool.stats()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Stop accepting events and drain queued handler invocations.
    pub async fn shutdown(&self) {
        info!(origin = %self.origin, "Shutting down event bus");
        self.pool.shutdown().await;
    }

    async fn broadcast(&self, event: &Event) -> Result<usize, BusError> {
        let envelope = BusEnvelope {
            origin: self.origin,
            event: event.clone(),
        };
        let message = envelope
            .encode()
            .map_err(|e| BusError::Broadcast(e.to_string()))?;
        self.store
            .publish(&self.config.channel, &message)
            .await
            .map_err(|e| BusError::Broadcast(e.to_string()))
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish_payload(
        &self,
        event_type: EventType,
        payload: Payload,
    ) -> Result<Event, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let event = Event::new(event_type, payload);
        if let Err(e) = self.events.save(&event).await {
            error!(event_id = %event.id, %event_type, error = %e, "Failed to persist event");
            return Err(e);
        }

        match self.broadcast(&event).await {
            Ok(receivers) => {
                debug!(event_id = %event.id, %event_type, receivers, "Event broadcast");
            }
            Err(e) => {
                BROADCAST_FAILURES.inc();
                warn!(event_id = %event.id, %event_type, error = %e, "Event persisted but not broadcast");
            }
        }

        self.events_published.fetch_add(1, Ordering::Relaxed);
        EVENTS_PUBLISHED
            .with_label_values(&[event_type.as_str()])
            .inc();

        if let Err(e) = self.dispatch(&event, DispatchPath::Local).await {
            warn!(event_id = %event.id, %event_type, error = %e, "Local dispatch skipped");
        }

        Ok(event)
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
