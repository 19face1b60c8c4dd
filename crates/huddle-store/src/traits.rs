//! Backend abstraction traits for Huddle.
//!
//! The presence store and broadcast channel must be visible identically from
//! every serving process; implementations are responsible for their own
//! internal concurrency safety.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use std::collections::BTreeSet;
use thiserror::Error;

/// A live subscription to the broadcast channel.
///
/// Yields raw payloads in the order the backend delivers them. The stream
/// ends when the underlying connection is lost and cannot be resumed; take a
/// new subscription instead.
pub type Subscription = BoxStream<'static, Bytes>;

/// Backend errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing service could not be reached or rejected the command.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The backend was shut down.
    #[error("Backend closed")]
    Closed,
}

/// Shared set of display names considered online.
///
/// `add`/`remove` are plain set operations, not counters: removing a name
/// once removes it regardless of how many connections share it.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Add a name to the set.
    async fn add(&self, name: &str) -> Result<(), StoreError>;

    /// Remove a name from the set.
    async fn remove(&self, name: &str) -> Result<(), StoreError>;

    /// Read the whole set.
    async fn all_members(&self) -> Result<BTreeSet<String>, StoreError>;
}

/// Shared publish/subscribe topic.
#[async_trait]
pub trait BroadcastChannel: Send + Sync {
    /// Publish a payload to every subscriber. Fire-and-forget: success only
    /// means the backend accepted it.
    async fn publish(&self, payload: Bytes) -> Result<(), StoreError>;

    /// Open a new subscription.
    async fn subscribe(&self) -> Result<Subscription, StoreError>;

    /// Backend name for logs and health output.
    fn name(&self) -> &'static str;
}
