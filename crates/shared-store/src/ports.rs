//! # Store Port
//!
//! Driven port implemented by the key-value backend. The method set mirrors
//! the primitives the core relies on and nothing more.

use crate::errors::StoreError;
use crate::subscription::ChannelSubscription;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Shared key-value store with per-key expiry, sets, hashes and pub/sub.
///
/// Every method is atomic with respect to other callers, including callers
/// in other processes.
#[async_trait]
pub trait SharedStore: Send + Sync {
    // -------------------------------------------------------------------------
    // Plain keys
    // -------------------------------------------------------------------------

    /// Read a string value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a string value, optionally expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Write only if the key does not exist. Returns `true` when written.
    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Delete a key of any kind. Returns `true` if it existed.
    async fn del(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically increment an integer counter, creating it at 0 first.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Set a time-to-live on an existing key. Returns `false` if missing.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    // -------------------------------------------------------------------------
    // Sets
    // -------------------------------------------------------------------------

    /// Add members. Returns how many were not already present.
    async fn sadd(&self, key: &str, members: &[String]) -> Result<usize, StoreError>;

    /// Remove members. Returns how many were present.
    async fn srem(&self, key: &str, members: &[String]) -> Result<usize, StoreError>;

    /// All members, in no particular order.
    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Membership test.
    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Cardinality.
    async fn scard(&self, key: &str) -> Result<usize, StoreError>;

    // -------------------------------------------------------------------------
    // Hashes
    // -------------------------------------------------------------------------

    /// Set a hash field. Returns `true` if the field is new.
    async fn hset(&self, hash: &str, field: &str, value: &str) -> Result<bool, StoreError>;

    /// Read a hash field.
    async fn hget(&self, hash: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Read every field of a hash.
    async fn hgetall(&self, hash: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Delete a hash field. Returns `true` if it existed.
    async fn hdel(&self, hash: &str, field: &str) -> Result<bool, StoreError>;

    // -------------------------------------------------------------------------
    // Publish / subscribe
    // -------------------------------------------------------------------------

    /// Publish a message. Returns the number of subscribers that got it.
    async fn publish(&self, channel: &str, message: &str) -> Result<usize, StoreError>;

    /// Subscribe to a channel. Only messages published afterwards are seen.
    async fn subscribe(&self, channel: &str) -> Result<ChannelSubscription, StoreError>;
}
