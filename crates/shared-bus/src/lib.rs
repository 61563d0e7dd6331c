//! # Shared Bus - Event Bus for Decoupled Side Effects
//!
//! State-changing actions (registration, login, purchases) publish domain
//! events here; their side effects (Discord announcements, emails, fraud
//! review) subscribe to them.
//!
//! ## Delivery Path
//!
//! ```text
//!  publish(type, payload)
//!        │
//!        ├─1─► EventStore::save          (fatal on failure)
//!        │
//!        ├─2─► SharedStore::publish      (logged on failure)
//!        │          │
//!        │          └──────────────► other processes ─► EventListener ─► dispatch
//!        │
//!        └─3─► dispatch (local)
//!                   │
//!                   ▼
//!             DispatchPool  ──► handler A ┐
//!             (bounded queue) ─► handler B ├ concurrent, isolated
//!                           ──► handler C ┘
//! ```
//!
//! ## Guarantees
//!
//! - **At-least-once**: a persisted event reaches every registered handler
//!   under normal operation. Handlers must be idempotent.
//! - **Exactly-once per process on the happy path**: envelopes carry the
//!   publishing bus's origin id and the listener skips its own.
//! - **Isolation**: handler errors and panics are caught at the worker
//!   boundary and logged; they never reach the publisher or sibling handlers.
//! - **No catch-up**: a disconnected listener misses broadcasts. The durable
//!   store is the ground truth (`replay_unprocessed`).

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod dispatcher;
pub mod errors;
pub mod events;
pub mod listener;
pub mod publisher;
pub mod store;
pub mod subscriber;

// Re-export main types
pub use dispatcher::{DispatchPath, DispatchPool, DispatchStats};
pub use errors::{BusError, HandlerError};
pub use events::{to_payload, BusEnvelope, Event, EventType, Payload};
pub use listener::EventListener;
pub use publisher::{BusConfig, EventBus, EventPublisher};
pub use store::{EventStore, InMemoryEventStore};
pub use subscriber::{handler_fn, EventHandler, FnHandler, HandlerId, HandlerRegistry};

/// Shared channel every bus instance broadcasts on.
pub const DEFAULT_EVENT_CHANNEL: &str = "biolink:events";

/// Concurrent handler invocations per process.
pub const DEFAULT_DISPATCH_WORKERS: usize = 8;

/// Handler jobs buffered before `publish` starts applying backpressure.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Wait before the listener re-subscribes after a receive error.
pub const DEFAULT_LISTENER_BACKOFF_MS: u64 = 1000;
