//! In-process backend.
//!
//! Clones share the same presence set and bus, so several relay nodes built
//! from clones of one `MemoryBackend` behave like several processes sharing
//! one Redis.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashSet;
use futures_util::StreamExt;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, trace, warn};

use crate::traits::{BroadcastChannel, PresenceStore, StoreError, Subscription};

/// Default bus capacity per subscriber.
const DEFAULT_BUS_CAPACITY: usize = 1024;

/// In-memory presence store and broadcast channel.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    members: DashSet<String>,
    bus: RwLock<broadcast::Sender<Bytes>>,
    capacity: usize,
}

impl MemoryBackend {
    /// Create a new backend with default bus capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Create a new backend with a specific bus capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (bus, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(Inner {
                members: DashSet::new(),
                bus: RwLock::new(bus),
                capacity,
            }),
        }
    }

    /// Number of live subscriptions.
    pub async fn subscriber_count(&self) -> usize {
        self.inner.bus.read().await.receiver_count()
    }

    /// End every live subscription, as a lost backend connection would.
    ///
    /// New subscriptions taken afterwards work normally.
    pub async fn disconnect_subscribers(&self) {
        let (bus, _) = broadcast::channel(self.inner.capacity);
        let old = std::mem::replace(&mut *self.inner.bus.write().await, bus);
        debug!(subscribers = old.receiver_count(), "Disconnecting memory bus subscribers");
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PresenceStore for MemoryBackend {
    async fn add(&self, name: &str) -> Result<(), StoreError> {
        self.inner.members.insert(name.to_string());
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), StoreError> {
        self.inner.members.remove(name);
        Ok(())
    }

    async fn all_members(&self) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .inner
            .members
            .iter()
            .map(|name| name.key().clone())
            .collect())
    }
}

#[async_trait]
impl BroadcastChannel for MemoryBackend {
    async fn publish(&self, payload: Bytes) -> Result<(), StoreError> {
        // No subscribers is not an error, the payload is simply lost.
        let receivers = self.inner.bus.read().await.send(payload).unwrap_or_default();
        trace!(receivers, "Published to memory bus");
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription, StoreError> {
        let rx = self.inner.bus.read().await.subscribe();
        Ok(receiver_stream(rx))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

fn receiver_stream(rx: broadcast::Receiver<Bytes>) -> Subscription {
    futures_util::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(payload) => return Some((payload, rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Memory bus subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}
