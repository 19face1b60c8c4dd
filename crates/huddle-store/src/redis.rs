//! Redis backend.
//!
//! Presence is a Redis set (`SADD`/`SREM`/`SMEMBERS`) and the broadcast
//! channel is a single pub/sub channel. Commands go over one multiplexed
//! connection; each subscription opens its own pub/sub connection.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::traits::{BroadcastChannel, PresenceStore, StoreError, Subscription};

/// Default presence set key.
pub const DEFAULT_PRESENCE_KEY: &str = "online_clients";

/// Default pub/sub channel.
pub const DEFAULT_CHANNEL: &str = "chat_channel";

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Redis backend configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://localhost:6379/`.
    pub url: String,
    /// Key of the presence set.
    pub presence_key: String,
    /// Pub/sub channel name.
    pub channel: String,
}

impl RedisConfig {
    /// Configuration for a server at `host:port` with default key names.
    #[must_use]
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            url: format!("redis://{host}:{port}/"),
            presence_key: DEFAULT_PRESENCE_KEY.to_string(),
            channel: DEFAULT_CHANNEL.to_string(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self::new("localhost", 6379)
    }
}

/// Presence store and broadcast channel backed by Redis.
#[derive(Clone)]
pub struct RedisBackend {
    client: Client,
    conn: MultiplexedConnection,
    config: RedisConfig,
}

impl RedisBackend {
    /// Connect to Redis and verify it answers.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the URL is invalid or the server
    /// cannot be reached.
    pub async fn connect(config: RedisConfig) -> Result<Self, StoreError> {
        let client = Client::open(config.url.as_str())?;
        let mut conn = client.get_multiplexed_async_connection().await?;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!(reply = %pong, "Redis answered PING");

        info!(
            url = %config.url,
            presence_key = %config.presence_key,
            channel = %config.channel,
            "Connected to Redis"
        );

        Ok(Self {
            client,
            conn,
            config,
        })
    }
}

#[async_trait]
impl PresenceStore for RedisBackend {
    async fn add(&self, name: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.sadd(&self.config.presence_key, name).await?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.srem(&self.config.presence_key, name).await?;
        Ok(())
    }

    async fn all_members(&self) -> Result<BTreeSet<String>, StoreError> {
        let mut conn = self.conn.clone();
        let names: Vec<String> = conn.smembers(&self.config.presence_key).await?;
        Ok(names.into_iter().collect())
    }
}

#[async_trait]
impl BroadcastChannel for RedisBackend {
    async fn publish(&self, payload: Bytes) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let receivers: usize = conn.publish(&self.config.channel, &payload[..]).await?;
        debug!(channel = %self.config.channel, receivers, "Published to Redis");
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription, StoreError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(self.config.channel.as_str()).await?;
        debug!(channel = %self.config.channel, "Subscribed to Redis channel");

        let stream = pubsub
            .into_on_message()
            .map(|msg| Bytes::copy_from_slice(msg.get_payload_bytes()));
        Ok(stream.boxed())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_config_defaults() {
        let config = RedisConfig::default();
        assert_eq!(config.url, "redis://localhost:6379/");
        assert_eq!(config.presence_key, "online_clients");
        assert_eq!(config.channel, "chat_channel");
    }

    #[tokio::test]
    async fn test_connect_unreachable() {
        // Nothing listens on port 1
        let result = RedisBackend::connect(RedisConfig::new("127.0.0.1", 1)).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn test_invalid_url() {
        let err: StoreError = Client::open("not a url").unwrap_err().into();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    /// Requires a Redis server at `REDIS_URL` (default `redis://127.0.0.1:6379/`).
    #[tokio::test]
    #[ignore]
    async fn test_live_presence_and_pubsub() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/".into());
        let config = RedisConfig {
            url,
            presence_key: "huddle_test_online".into(),
            channel: "huddle_test_channel".into(),
        };
        let backend = RedisBackend::connect(config).await.unwrap();

        backend.add("bob").await.unwrap();
        assert!(backend.all_members().await.unwrap().contains("bob"));
        backend.remove("bob").await.unwrap();
        assert!(!backend.all_members().await.unwrap().contains("bob"));

        let mut sub = backend.subscribe().await.unwrap();
        backend.publish(Bytes::from_static(b"ping")).await.unwrap();
        assert_eq!(&sub.next().await.unwrap()[..], b"ping");
    }
}
