//! The hub: single owner of the connection registry.
//!
//! Sessions and the relay loop run on their own tasks and never share the
//! registry. They send [`HubCommand`]s through a [`HubHandle`], and the hub
//! applies them one at a time in arrival order.

use huddle_protocol::ServerEvent;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::error::RelayError;
use crate::registry::{Connection, ConnectionId, ConnectionRegistry};

/// Work for the hub.
#[derive(Debug)]
pub enum HubCommand {
    /// Add a connection to the registry.
    Register(Connection),
    /// Remove a connection from the registry.
    Unregister(ConnectionId),
    /// Send an event to every registered connection.
    Deliver(ServerEvent),
    /// Report registry statistics.
    Stats(oneshot::Sender<HubStats>),
}

/// Hub statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStats {
    /// Number of registered connections.
    pub connections: usize,
    /// Number of events delivered since start.
    pub delivered: u64,
}

/// Cloneable sender side of the hub's command queue.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    /// Register a connection.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::HubClosed` if the hub has stopped.
    pub fn register(&self, connection: Connection) -> Result<(), RelayError> {
        self.send(HubCommand::Register(connection))
    }

    /// Unregister a connection.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::HubClosed` if the hub has stopped.
    pub fn unregister(&self, id: ConnectionId) -> Result<(), RelayError> {
        self.send(HubCommand::Unregister(id))
    }

    /// Deliver an event to every connection registered when the hub gets to it.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::HubClosed` if the hub has stopped.
    pub fn deliver(&self, event: ServerEvent) -> Result<(), RelayError> {
        self.send(HubCommand::Deliver(event))
    }

    /// Fetch registry statistics.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::HubClosed` if the hub has stopped.
    pub async fn stats(&self) -> Result<HubStats, RelayError> {
        let (tx, rx) = oneshot::channel();
        self.send(HubCommand::Stats(tx))?;
        rx.await.map_err(|_| RelayError::HubClosed)
    }

    fn send(&self, command: HubCommand) -> Result<(), RelayError> {
        self.tx.send(command).map_err(|_| RelayError::HubClosed)
    }
}

/// The registry-owning task.
#[derive(Debug)]
pub struct Hub {
    registry: ConnectionRegistry,
    rx: mpsc::UnboundedReceiver<HubCommand>,
    delivered: u64,
}

impl Hub {
    /// Create a hub and the handle used to reach it.
    #[must_use]
    pub fn new() -> (Self, HubHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = Self {
            registry: ConnectionRegistry::new(),
            rx,
            delivered: 0,
        };
        (hub, HubHandle { tx })
    }

    /// Process commands until every handle is dropped.
    pub async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            self.apply(command);
        }
        debug!(remaining = self.registry.len(), "Hub stopped");
    }

    fn apply(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register(connection) => self.registry.register(connection),
            HubCommand::Unregister(id) => {
                self.registry.unregister(id);
            }
            HubCommand::Deliver(event) => self.deliver(event),
            HubCommand::Stats(reply) => {
                let _ = reply.send(HubStats {
                    connections: self.registry.len(),
                    delivered: self.delivered,
                });
            }
        }
    }

    fn deliver(&mut self, event: ServerEvent) {
        let kind = event.kind();
        let event = Arc::new(event);
        let mut recipients = 0usize;

        for connection in self.registry.iter() {
            if connection.send(Arc::clone(&event)) {
                recipients += 1;
            } else {
                // The session is on its way out and will unregister itself
                trace!(connection = %connection.id(), "Skipping closed connection");
            }
        }

        self.delivered += 1;
        trace!(kind = kind.as_str(), recipients, "Delivered");
    }
}
