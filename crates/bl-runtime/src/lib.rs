//! # Biolink Runtime
//!
//! Wires the core subsystems into one process.
//!
//! ## Modular Structure
//!
//! - `config/` - Process role and tunables from the environment
//! - `adapters/` - Outbound notifier implementations
//! - `handlers/` - Event handlers subscribed to the bus
//! - `runtime/` - Component ownership, startup and shutdown
//!
//! ## Event Flow
//!
//! ```text
//! API process                          Bot process
//! ───────────                          ───────────
//! AltDetector ──publish──→ EventBus    EventBus
//!                            │  │         ↑
//!               local dispatch  │         │ remote dispatch
//!                            │  └─broadcast──→ EventListener
//!                            ↓                  │
//!                        AuditLogHandler        ↓
//!                                        AltAccountAnnouncer ──→ Notifier
//! ```
//!
//! Delivery is at least once: a process that publishes and also listens
//! skips its own broadcasts, but separate processes may each run the same
//! handler. Handlers are expected to be idempotent.

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod runtime;

pub use config::{ProcessRole, RuntimeConfig, DEFAULT_ROLLOUT_INTERVAL_SECS};
pub use runtime::{run_rollout_scheduler, BiolinkRuntime, RuntimeDeps, RuntimeError};
