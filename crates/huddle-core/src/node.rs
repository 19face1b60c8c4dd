//! One serving process worth of relay machinery.
//!
//! A [`Node`] owns the hub task and the relay loop. Build one at startup,
//! hand out [`Session`]s per accepted connection, and call
//! [`Node::shutdown`] on the way out.

use huddle_store::{BroadcastChannel, PresenceStore};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::RelayError;
use crate::hub::{Hub, HubHandle, HubStats};
use crate::relay::{RelayConfig, RelayLoop};
use crate::session::Session;

/// The relay engine of a serving process.
pub struct Node {
    hub: HubHandle,
    presence: Arc<dyn PresenceStore>,
    broadcast: Arc<dyn BroadcastChannel>,
    shutdown: CancellationToken,
    relay_task: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    /// Start the hub and the relay loop.
    ///
    /// The broadcast subscription is taken before this returns, so every
    /// event published afterwards reaches this node.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::StoreUnavailable` if the broadcast channel
    /// cannot be subscribed to.
    pub async fn start(
        presence: Arc<dyn PresenceStore>,
        broadcast: Arc<dyn BroadcastChannel>,
        config: RelayConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, RelayError> {
        let (hub, handle) = Hub::new();

        let relay = RelayLoop::start(
            Arc::clone(&broadcast),
            Arc::clone(&presence),
            handle.clone(),
            config,
            shutdown.clone(),
        )
        .await?;

        tokio::spawn(hub.run());
        let relay_task = relay.spawn();

        info!(backend = broadcast.name(), "Relay node started");

        Ok(Self {
            hub: handle,
            presence,
            broadcast,
            shutdown,
            relay_task: Mutex::new(Some(relay_task)),
        })
    }

    /// Start a node on a backend that provides both presence and broadcast.
    ///
    /// # Errors
    ///
    /// See [`Node::start`].
    pub async fn with_backend<B>(
        backend: B,
        config: RelayConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, RelayError>
    where
        B: PresenceStore + BroadcastChannel + 'static,
    {
        let backend = Arc::new(backend);
        Self::start(backend.clone(), backend, config, shutdown).await
    }

    /// Create a session for a newly accepted connection.
    #[must_use]
    pub fn session(&self, username: Option<&str>) -> Session {
        Session::new(
            self.hub.clone(),
            Arc::clone(&self.presence),
            Arc::clone(&self.broadcast),
            username,
        )
    }

    /// Registry statistics for this node.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::HubClosed` if the hub has stopped.
    pub async fn stats(&self) -> Result<HubStats, RelayError> {
        self.hub.stats().await
    }

    /// Name of the backend in use.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.broadcast.name()
    }

    /// Token that stops the relay loop when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop the relay loop and wait for it to release the subscription.
    ///
    /// The hub keeps running until the last session referencing it is gone.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(task) = self.relay_task.lock().await.take() {
            let _ = task.await;
            info!("Relay node stopped");
        }
    }
}
