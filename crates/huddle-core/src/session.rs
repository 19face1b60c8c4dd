//! Connection lifecycle.
//!
//! A [`Session`] is the transport-independent half of a client connection.
//! The server feeds it inbound text and drains the queue returned by
//! [`Session::open`]; the session keeps the registry, the presence store
//! and the other processes informed.
//!
//! ```text
//! Connecting ──open()──▶ Open ──close() / drop──▶ Closed
//! ```

use huddle_protocol::{codec, BusEvent, ServerEvent};
use huddle_store::{BroadcastChannel, PresenceStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::hub::HubHandle;
use crate::name::resolve_display_name;
use crate::registry::{Connection, ConnectionId};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake done, not yet announced.
    Connecting,
    /// Registered, present and receiving events.
    Open,
    /// Gone. Terminal.
    Closed,
}

/// Per-connection handler.
pub struct Session {
    id: ConnectionId,
    name: String,
    state: SessionState,
    hub: HubHandle,
    presence: Arc<dyn PresenceStore>,
    broadcast: Arc<dyn BroadcastChannel>,
}

impl Session {
    /// Create a session in the `Connecting` state.
    ///
    /// The display name is `requested` when it is non-blank, otherwise a
    /// generated `User-xxxxxxxx` name.
    #[must_use]
    pub fn new(
        hub: HubHandle,
        presence: Arc<dyn PresenceStore>,
        broadcast: Arc<dyn BroadcastChannel>,
        requested: Option<&str>,
    ) -> Self {
        Self {
            id: ConnectionId::generate(),
            name: resolve_display_name(requested),
            state: SessionState::Connecting,
            hub,
            presence,
            broadcast,
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

    /// Get the lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Enter `Open`: queue the welcome, register with the hub, mark the name
    /// present and announce the presence change.
    ///
    /// Returns the queue of events for this client. The welcome is always
    /// the first event on it.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyOpened` unless the session is `Connecting`,
    /// `HubClosed` if the hub has stopped and `StoreUnavailable` if the name
    /// cannot be added to the presence store. On error the session is
    /// `Closed` and nothing is left registered.
    pub async fn open(&mut self) -> Result<mpsc::UnboundedReceiver<Arc<ServerEvent>>, RelayError> {
        if self.state != SessionState::Connecting {
            return Err(RelayError::AlreadyOpened);
        }
        self.state = SessionState::Closed;

        let (tx, rx) = mpsc::unbounded_channel();
        // Queued before registering so no roster can overtake it
        let _ = tx.send(Arc::new(ServerEvent::welcome(&self.name)));

        self.hub
            .register(Connection::new(self.id, self.name.clone(), tx))?;

        if let Err(e) = self.presence.add(&self.name).await {
            let _ = self.hub.unregister(self.id);
            return Err(e.into());
        }

        self.state = SessionState::Open;
        publish_presence_changed(self.broadcast.as_ref()).await;

        debug!(connection = %self.id, name = %self.name, "Session opened");
        Ok(rx)
    }

    /// Publish inbound text as a chat message from this session.
    ///
    /// Nothing is delivered locally here; the relay loop delivers the
    /// message to every connection, the sender included.
    ///
    /// # Errors
    ///
    /// Returns `NotOpen` unless the session is `Open`, and
    /// `StoreUnavailable` if the broadcast channel rejects the publish.
    pub async fn on_text(&self, text: impl Into<String>) -> Result<(), RelayError> {
        if self.state != SessionState::Open {
            return Err(RelayError::NotOpen);
        }

        let payload = codec::encode_bus(&BusEvent::message(self.name.clone(), text))?;
        self.broadcast.publish(payload).await?;
        Ok(())
    }

    /// Enter `Closed`: unregister, drop the name from presence and announce
    /// the change. Calling it again, or on a session that never opened, does
    /// nothing.
    pub async fn close(&mut self) {
        let was_open = self.state == SessionState::Open;
        self.state = SessionState::Closed;

        if was_open {
            depart(
                self.id,
                self.name.clone(),
                self.hub.clone(),
                Arc::clone(&self.presence),
                Arc::clone(&self.broadcast),
            )
            .await;
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state != SessionState::Open {
            return;
        }
        self.state = SessionState::Closed;

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(depart(
                    self.id,
                    std::mem::take(&mut self.name),
                    self.hub.clone(),
                    Arc::clone(&self.presence),
                    Arc::clone(&self.broadcast),
                ));
            }
            Err(_) => {
                warn!(connection = %self.id, name = %self.name, "Session dropped outside a runtime, presence left stale");
            }
        }
    }
}

async fn depart(
    id: ConnectionId,
    name: String,
    hub: HubHandle,
    presence: Arc<dyn PresenceStore>,
    broadcast: Arc<dyn BroadcastChannel>,
) {
    let _ = hub.unregister(id);

    // Removes the name even if another connection still uses it
    if let Err(e) = presence.remove(&name).await {
        warn!(connection = %id, name = %name, error = %e, "Failed to remove presence");
    }

    publish_presence_changed(broadcast.as_ref()).await;
    debug!(connection = %id, name = %name, "Session closed");
}

async fn publish_presence_changed(broadcast: &dyn BroadcastChannel) {
    let payload = match codec::encode_bus(&BusEvent::PresenceChanged) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Failed to encode presence signal");
            return;
        }
    };

    if let Err(e) = broadcast.publish(payload).await {
        // Rosters stay stale until the next presence change
        warn!(error = %e, "Failed to publish presence signal");
    }
}
