//! # Shared Store
//!
//! The key-value capability every core subsystem coordinates through.
//!
//! ## Consistency Model
//!
//! There is no cross-process locking. Each operation on [`SharedStore`] is a
//! single atomic primitive (set add/check, counter increment, set-if-absent,
//! key set with expiry), so callers never need a read-then-write sequence to
//! stay correct under concurrency.
//!
//! ```text
//! ┌──────────────┐        ┌──────────────┐
//! │  API process │        │  Bot process │
//! └──────┬───────┘        └──────┬───────┘
//!        │  sadd / incr / hset   │
//!        ▼                       ▼
//!  ┌───────────────────────────────────┐
//!  │           Shared Store            │
//!  │  keys · sets · hashes · channels  │
//!  └───────────────────────────────────┘
//! ```
//!
//! [`RedisStore`] is the deployed backend. [`InMemoryStore`] keeps the same
//! per-primitive guarantees inside one process and backs the test suites.

pub mod errors;
pub mod memory;
pub mod ports;
pub mod redis_store;
pub mod subscription;

pub use errors::StoreError;
pub use memory::InMemoryStore;
pub use ports::SharedStore;
pub use redis_store::RedisStore;
pub use subscription::ChannelSubscription;

/// Messages buffered per channel subscriber before it starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
