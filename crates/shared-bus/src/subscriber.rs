//! # Event Subscriber
//!
//! Defines the subscription side of the bus: the handler contract and the
//! process-local registry mapping event types to handlers.

use crate::errors::HandlerError;
use crate::events::{Event, EventType};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Trait implemented by everything that reacts to events.
///
/// Handlers can be invoked more than once for the same event and can run
/// concurrently with sibling handlers of the same type. They must be
/// idempotent and must not assume mutual exclusion.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// React to an event.
    async fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}

/// Handler built from an async closure.
pub struct FnHandler<F> {
    name: String,
    f: F,
}

/// Wrap an async closure as an [`EventHandler`].
///
/// ```rust,ignore
/// let handler = handler_fn("audit", |event: Event| async move {
///     tracing::info!(event_id = %event.id, "audited");
///     Ok(())
/// });
/// bus.subscribe(EventType::UserDeleted, Arc::new(handler));
/// ```
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    FnHandler {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        (self.f)(event.clone()).await
    }
}

/// Identifies one registration, returned by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(Uuid);

impl HandlerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of the registry.
#[derive(Clone)]
pub struct Registration {
    pub id: HandlerId,
    pub handler: Arc<dyn EventHandler>,
}

/// Process-local map from event type to its ordered handler list.
///
/// Read on every dispatch, written only at start-up and shutdown, hence the
/// read/write lock.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<EventType, Vec<Registration>>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `event_type`.
    pub fn register(&self, event_type: EventType, handler: Arc<dyn EventHandler>) -> HandlerId {
        let id = HandlerId::new();
        debug!(%event_type, handler = handler.name(), %id, "Handler registered");
        self.handlers
            .write()
            .entry(event_type)
            .or_default()
            .push(Registration { id, handler });
        id
    }

    /// Remove one registration. Returns `false` if it was not registered.
    pub fn unregister(&self, event_type: EventType, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(&event_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| r.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(&event_type);
        }
        if removed {
            debug!(%event_type, %id, "Handler unregistered");
        }
        removed
    }

    /// Snapshot of the handlers for `event_type`, in registration order.
    #[must_use]
    pub fn handlers_for(&self, event_type: EventType) -> Vec<Registration> {
        self.handlers
            .read()
            .get(&event_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of handlers registered for `event_type`.
    #[must_use]
    pub fn handler_count(&self, event_type: EventType) -> usize {
        self.handlers.read().get(&event_type).map_or(0, Vec::len)
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.handlers.write().clear();
    }
}
