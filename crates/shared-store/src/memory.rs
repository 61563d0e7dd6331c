//! In-memory Shared Store Adapter
//!
//! Implements [`SharedStore`] inside one process. Every operation takes the
//! entry lock once, which gives the same per-primitive atomicity a networked
//! store provides across processes. Expiry is evaluated lazily on access.
//!
//! Several logical "processes" can share one instance through an `Arc`, which
//! is how the cross-process paths are exercised in tests.

use crate::errors::StoreError;
use crate::ports::SharedStore;
use crate::subscription::ChannelSubscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(HashSet<String>),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory key-value store with pub/sub channels.
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    channel_capacity: usize,
    offline: AtomicBool,
}

impl InMemoryStore {
    /// Create an empty store with the default channel capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create an empty store with a custom per-channel buffer.
    #[must_use]
    pub fn with_channel_capacity(channel_capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            channel_capacity: channel_capacity.max(1),
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate an outage: while offline every operation fails with
    /// `StoreError::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of live keys (expired keys excluded).
    #[must_use]
    pub fn key_count(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }

    /// Run `f` against the live entry for `key`, purging it first if expired.
    fn with_entry<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut HashMap<String, Entry>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        self.ensure_online()?;
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|e| e.is_expired(Instant::now())) {
            trace!(key, "Purging expired key");
            entries.remove(key);
        }
        f(&mut entries)
    }

    fn wrong_type(key: &str) -> StoreError {
        StoreError::WrongType {
            key: key.to_string(),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_entry(key, |entries| match entries.get(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(Self::wrong_type(key)),
        })
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.with_entry(key, |entries| {
            let mut entry = Entry::new(Value::Str(value.to_string()));
            entry.expires_at = ttl.map(|d| Instant::now() + d);
            entries.insert(key.to_string(), entry);
            Ok(())
        })
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.with_entry(key, |entries| {
            if entries.contains_key(key) {
                return Ok(false);
            }
            let mut entry = Entry::new(Value::Str(value.to_string()));
            entry.expires_at = ttl.map(|d| Instant::now() + d);
            entries.insert(key.to_string(), entry);
            Ok(true)
        })
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        self.with_entry(key, |entries| Ok(entries.remove(key).is_some()))
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.with_entry(key, |entries| {
            let entry = entries
                .entry(key.to_string())
                .or_insert_with(|| Entry::new(Value::Str("0".to_string())));
            let Value::Str(current) = &mut entry.value else {
                return Err(Self::wrong_type(key));
            };
            let next = current
                .parse::<i64>()
                .map_err(|_| StoreError::NotInteger {
                    key: key.to_string(),
                })?
                .saturating_add(1);
            *current = next.to_string();
            Ok(next)
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.with_entry(key, |entries| match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        })
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<usize, StoreError> {
        self.with_entry(key, |entries| {
            let entry = entries
                .entry(key.to_string())
                .or_insert_with(|| Entry::new(Value::Set(HashSet::new())));
            let Value::Set(set) = &mut entry.value else {
                return Err(Self::wrong_type(key));
            };
            Ok(members.iter().filter(|m| set.insert((*m).clone())).count())
        })
    }

    async fn srem(&self, key: &str, members: &[String]) -> Result<usize, StoreError> {
        self.with_entry(key, |entries| {
            let Some(entry) = entries.get_mut(key) else {
                return Ok(0);
            };
            let Value::Set(set) = &mut entry.value else {
                return Err(Self::wrong_type(key));
            };
            let removed = members.iter().filter(|m| set.remove(m.as_str())).count();
            if set.is_empty() {
                entries.remove(key);
            }
            Ok(removed)
        })
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.with_entry(key, |entries| match entries.get(key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(Self::wrong_type(key)),
        })
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.with_entry(key, |entries| match entries.get(key) {
            None => Ok(false),
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(set.contains(member)),
            Some(_) => Err(Self::wrong_type(key)),
        })
    }

    async fn scard(&self, key: &str) -> Result<usize, StoreError> {
        self.with_entry(key, |entries| match entries.get(key) {
            None => Ok(0),
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(set.len()),
            Some(_) => Err(Self::wrong_type(key)),
        })
    }

    async fn hset(&self, hash: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        self.with_entry(hash, |entries| {
            let entry = entries
                .entry(hash.to_string())
                .or_insert_with(|| Entry::new(Value::Hash(HashMap::new())));
            let Value::Hash(map) = &mut entry.value else {
                return Err(Self::wrong_type(hash));
            };
            Ok(map.insert(field.to_string(), value.to_string()).is_none())
        })
    }

    async fn hget(&self, hash: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.with_entry(hash, |entries| match entries.get(hash) {
            None => Ok(None),
            Some(Entry {
                value: Value::Hash(map),
                ..
            }) => Ok(map.get(field).cloned()),
            Some(_) => Err(Self::wrong_type(hash)),
        })
    }

    async fn hgetall(&self, hash: &str) -> Result<HashMap<String, String>, StoreError> {
        self.with_entry(hash, |entries| match entries.get(hash) {
            None => Ok(HashMap::new()),
            Some(Entry {
                value: Value::Hash(map),
                ..
            }) => Ok(map.clone()),
            Some(_) => Err(Self::wrong_type(hash)),
        })
    }

    async fn hdel(&self, hash: &str, field: &str) -> Result<bool, StoreError> {
        self.with_entry(hash, |entries| {
            let Some(entry) = entries.get_mut(hash) else {
                return Ok(false);
            };
            let Value::Hash(map) = &mut entry.value else {
                return Err(Self::wrong_type(hash));
            };
            let existed = map.remove(field).is_some();
            if map.is_empty() {
                entries.remove(hash);
            }
            Ok(existed)
        })
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<usize, StoreError> {
        self.ensure_online()?;
        let sender = self.channels.lock().get(channel).cloned();
        let Some(sender) = sender else {
            return Ok(0);
        };
        match sender.send(message.to_string()) {
            Ok(receivers) => {
                debug!(channel, receivers, "Message published");
                Ok(receivers)
            }
            // No receivers left - message is dropped, same as a networked store
            Err(_) => Ok(0),
        }
    }

    async fn subscribe(&self, channel: &str) -> Result<ChannelSubscription, StoreError> {
        self.ensure_online()?;
        let receiver = self
            .channels
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.channel_capacity).0)
            .subscribe();
        debug!(channel, "New channel subscription");
        Ok(ChannelSubscription::new(channel, receiver))
    }
}
