//! Connection registry.
//!
//! A plain map of live connections. It has no interior locking: the
//! [`Hub`](crate::hub::Hub) owns it and is the only code that mutates or
//! iterates it.

use huddle_protocol::ServerEvent;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Queue of events waiting to be written to one client.
pub type Outbound = mpsc::UnboundedSender<Arc<ServerEvent>>;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-local identity of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate a fresh identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0)
    }
}

/// One live client connection as seen by the registry.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    name: String,
    outbound: Outbound,
}

impl Connection {
    /// Create a connection entry.
    #[must_use]
    pub fn new(id: ConnectionId, name: impl Into<String>, outbound: Outbound) -> Self {
        Self {
            id,
            name: name.into(),
            outbound,
        }
    }

    /// Get the connection identifier.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the client side is still reading.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Queue an event for this connection.
    ///
    /// Returns `false` if the connection is gone.
    pub fn send(&self, event: Arc<ServerEvent>) -> bool {
        self.outbound.send(event).is_ok()
    }
}

/// Set of live connections in this process.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. Re-registering an id replaces the old entry.
    pub fn register(&mut self, connection: Connection) {
        debug!(connection = %connection.id, name = %connection.name, "Registered");
        self.connections.insert(connection.id, connection);
    }

    /// Remove a connection, returning it if it was registered.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Connection> {
        let removed = self.connections.remove(&id);
        if let Some(conn) = &removed {
            debug!(connection = %id, name = %conn.name, "Unregistered");
        }
        removed
    }

    /// Snapshot of every registered connection.
    ///
    /// The snapshot is independent of the registry, so it stays valid while
    /// the registry changes.
    #[must_use]
    pub fn all_connections(&self) -> Vec<Connection> {
        self.connections.values().cloned().collect()
    }

    /// Iterate over registered connections.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Check if a connection is registered.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
