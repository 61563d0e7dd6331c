//! Redis Shared Store Adapter
//!
//! Production implementation of [`SharedStore`]. Commands go through one
//! [`ConnectionManager`], which reconnects on its own after a dropped
//! connection. Every `subscribe` opens a dedicated pub/sub connection and a
//! forwarding task that feeds a broadcast buffer, so callers see the same
//! [`ChannelSubscription`] the in-memory store hands out.
//!
//! When the pub/sub connection drops the forwarder ends, the subscription
//! reports `StoreError::ChannelClosed` and the caller resubscribes.

use crate::errors::StoreError;
use crate::ports::SharedStore;
use crate::subscription::ChannelSubscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{Client, Cmd, FromRedisValue, RedisError};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Reconnect attempts before a command fails with `Unavailable`.
const CONNECT_RETRIES: usize = 3;

/// Shared store backed by a Redis server.
pub struct RedisStore {
    client: Client,
    connection: ConnectionManager,
    channel_capacity: usize,
}

impl RedisStore {
    /// Connect to `redis_url` (`redis://host:port/db`).
    ///
    /// # Errors
    ///
    /// `StoreError::Unavailable` if the URL is malformed or the server cannot
    /// be reached.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)
            .map_err(|e| StoreError::Unavailable(format!("invalid redis url: {e}")))?;
        let config = ConnectionManagerConfig::new().set_number_of_retries(CONNECT_RETRIES);
        let connection = client
            .get_connection_manager_with_config(config)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        info!(url = %redacted(redis_url), "Connected to shared store");
        Ok(Self {
            client,
            connection,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        })
    }

    /// Per-subscription buffer before a slow reader starts lagging.
    #[must_use]
    pub fn with_channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity.max(1);
        self
    }

    async fn query<T: FromRedisValue>(&self, key: &str, cmd: &Cmd) -> Result<T, StoreError> {
        let mut connection = self.connection.clone();
        cmd.query_async(&mut connection)
            .await
            .map_err(|e| store_error(key, &e))
    }
}

fn store_error(key: &str, err: &RedisError) -> StoreError {
    classify(key, err.code(), &err.to_string())
}

fn classify(key: &str, code: Option<&str>, message: &str) -> StoreError {
    match code {
        Some("WRONGTYPE") => StoreError::WrongType {
            key: key.to_string(),
        },
        _ if message.contains("not an integer") => StoreError::NotInteger {
            key: key.to_string(),
        },
        _ => StoreError::Unavailable(message.to_string()),
    }
}

/// Redis rejects a zero expiry.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Strip the password from a connection URL before logging it.
fn redacted(redis_url: &str) -> String {
    match (redis_url.find("://"), redis_url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            format!("{}://***{}", &redis_url[..scheme], &redis_url[at..])
        }
        _ => redis_url.to_string(),
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.query(key, redis::cmd("GET").arg(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        self.query(key, &cmd).await
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let reply: Option<String> = self.query(key, &cmd).await?;
        Ok(reply.is_some())
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let removed: i64 = self.query(key, redis::cmd("DEL").arg(key)).await?;
        Ok(removed > 0)
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.query(key, redis::cmd("INCR").arg(key)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let applied: i64 = self
            .query(key, redis::cmd("PEXPIRE").arg(key).arg(ttl_millis(ttl)))
            .await?;
        Ok(applied == 1)
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<usize, StoreError> {
        if members.is_empty() {
            return Ok(0);
        }
        self.query(key, redis::cmd("SADD").arg(key).arg(members))
            .await
    }

    async fn srem(&self, key: &str, members: &[String]) -> Result<usize, StoreError> {
        if members.is_empty() {
            return Ok(0);
        }
        self.query(key, redis::cmd("SREM").arg(key).arg(members))
            .await
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.query(key, redis::cmd("SMEMBERS").arg(key)).await
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let present: i64 = self
            .query(key, redis::cmd("SISMEMBER").arg(key).arg(member))
            .await?;
        Ok(present == 1)
    }

    async fn scard(&self, key: &str) -> Result<usize, StoreError> {
        self.query(key, redis::cmd("SCARD").arg(key)).await
    }

    async fn hset(&self, hash: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        let created: i64 = self
            .query(hash, redis::cmd("HSET").arg(hash).arg(field).arg(value))
            .await?;
        Ok(created == 1)
    }

    async fn hget(&self, hash: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.query(hash, redis::cmd("HGET").arg(hash).arg(field))
            .await
    }

    async fn hgetall(&self, hash: &str) -> Result<HashMap<String, String>, StoreError> {
        self.query(hash, redis::cmd("HGETALL").arg(hash)).await
    }

    async fn hdel(&self, hash: &str, field: &str) -> Result<bool, StoreError> {
        let removed: i64 = self
            .query(hash, redis::cmd("HDEL").arg(hash).arg(field))
            .await?;
        Ok(removed == 1)
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<usize, StoreError> {
        self.query(channel, redis::cmd("PUBLISH").arg(channel).arg(message))
            .await
    }

    async fn subscribe(&self, channel: &str) -> Result<ChannelSubscription, StoreError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| store_error(channel, &e))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| store_error(channel, &e))?;

        let (sender, receiver) = broadcast::channel(self.channel_capacity);
        let name = channel.to_string();
        let forwarder = tokio::spawn(async move {
            let mut messages = Box::pin(pubsub.into_on_message());
            while let Some(message) = messages.next().await {
                match message.get_payload::<String>() {
                    Ok(payload) => {
                        if sender.send(payload).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(channel = %name, error = %e, "Dropping undecodable message"),
                }
            }
            debug!(channel = %name, "Pub/sub connection closed");
        });

        debug!(channel, "Subscribed");
        Ok(ChannelSubscription::with_forwarder(
            channel,
            receiver,
            forwarder.abort_handle(),
        ))
    }
}
