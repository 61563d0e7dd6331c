//! # Durable Event Store
//!
//! Every published event is written here before it is broadcast. The store
//! is the ground truth for replay and auditing.

use crate::errors::BusError;
use crate::events::Event;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Outbound port to the durable event table.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a new event.
    async fn save(&self, event: &Event) -> Result<(), BusError>;

    /// Flag an event as processed. Acknowledging twice keeps the first
    /// timestamp.
    async fn mark_processed(&self, id: Uuid, at: DateTime<Utc>) -> Result<Event, BusError>;

    /// Fetch one event.
    async fn get(&self, id: Uuid) -> Result<Option<Event>, BusError>;

    /// Oldest-first list of events not yet acknowledged.
    async fn list_unprocessed(&self, limit: usize) -> Result<Vec<Event>, BusError>;
}

#[derive(Default)]
struct Table {
    rows: HashMap<Uuid, Event>,
    order: Vec<Uuid>,
}

/// In-memory event table.
#[derive(Default)]
pub struct InMemoryEventStore {
    table: RwLock<Table>,
    offline: AtomicBool,
}

impl InMemoryEventStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `BusError::Persistence`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of stored events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_online(&self) -> Result<(), BusError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(BusError::Persistence("event store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn save(&self, event: &Event) -> Result<(), BusError> {
        self.check_online()?;
        let mut table = self.table.write();
        if table.rows.contains_key(&event.id) {
            return Err(BusError::Persistence(format!(
                "duplicate event id {}",
                event.id
            )));
        }
        table.order.push(event.id);
        table.rows.insert(event.id, event.clone());
        Ok(())
    }

    async fn mark_processed(&self, id: Uuid, at: DateTime<Utc>) -> Result<Event, BusError> {
        self.check_online()?;
        let mut table = self.table.write();
        let row = table.rows.get_mut(&id).ok_or(BusError::NotFound(id))?;
        if !row.processed {
            row.processed = true;
            row.processed_at = Some(at);
        }
        Ok(row.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Event>, BusError> {
        self.check_online()?;
        Ok(self.table.read().rows.get(&id).cloned())
    }

    async fn list_unprocessed(&self, limit: usize) -> Result<Vec<Event>, BusError> {
        self.check_online()?;
        let table = self.table.read();
        Ok(table
            .order
            .iter()
            .filter_map(|id| table.rows.get(id))
            .filter(|event| !event.processed)
            .take(limit)
            .cloned()
            .collect())
    }
}
