//! The relay loop.
//!
//! One relay runs per serving process. It consumes the shared broadcast
//! channel and turns each bus event into a delivery request for the local
//! hub:
//!
//! - `message` is delivered as-is to every local connection
//! - `presence` triggers a fresh read of the presence store, and the
//!   resulting roster is delivered to every local connection
//!
//! Malformed payloads are logged and dropped. A lost subscription is
//! re-established with exponential backoff, followed by a roster refresh
//! since presence signals may have been missed in between. A roster read
//! that fails is retried with the same backoff until it succeeds.

use futures_util::StreamExt;
use huddle_protocol::{codec, BusEvent, ServerEvent};
use huddle_store::{BroadcastChannel, PresenceStore, Subscription};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::RelayError;
use crate::hub::HubHandle;

/// Relay configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// First delay before resubscribing.
    pub initial_backoff: Duration,
    /// Upper bound for the resubscribe delay.
    pub max_backoff: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Exponential backoff: doubles each attempt up to a cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Create a backoff starting at `initial` and capped at `max`.
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Get the delay for this attempt and advance.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Start over from the initial delay.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl From<&RelayConfig> for Backoff {
    fn from(config: &RelayConfig) -> Self {
        Self::new(config.initial_backoff, config.max_backoff)
    }
}

/// Consumer of the broadcast channel for one process.
pub struct RelayLoop {
    relay: Relay,
    subscription: Option<Subscription>,
}

/// The shareable part of the loop; the subscription is kept apart because
/// it is `Send` but not `Sync`.
struct Relay {
    broadcast: Arc<dyn BroadcastChannel>,
    presence: Arc<dyn PresenceStore>,
    hub: HubHandle,
    config: RelayConfig,
    shutdown: CancellationToken,
}

impl RelayLoop {
    /// Take the initial subscription.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::StoreUnavailable` if the broadcast channel cannot
    /// be subscribed to. At startup this is fatal.
    pub async fn start(
        broadcast: Arc<dyn BroadcastChannel>,
        presence: Arc<dyn PresenceStore>,
        hub: HubHandle,
        config: RelayConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, RelayError> {
        let subscription = broadcast.subscribe().await?;
        info!(backend = broadcast.name(), "Relay subscribed to broadcast channel");

        Ok(Self {
            relay: Relay {
                broadcast,
                presence,
                hub,
                config,
                shutdown,
            },
            subscription: Some(subscription),
        })
    }

    /// Run the loop on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Consume the channel until shutdown or until the hub goes away.
    pub async fn run(self) {
        let RelayLoop {
            relay,
            mut subscription,
        } = self;
        let mut backoff = Backoff::from(&relay.config);

        loop {
            let mut current = match subscription.take() {
                Some(current) => current,
                None => match relay.resubscribe(&mut backoff).await {
                    Some(current) => current,
                    None => break,
                },
            };

            if !relay.consume(&mut current).await {
                break;
            }
            warn!(backend = relay.broadcast.name(), "Broadcast subscription ended");
        }

        info!("Relay loop stopped");
    }

    /// Decode one bus payload and hand the result to the hub.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` for malformed payloads, `StoreUnavailable` if
    /// the roster cannot be read and `HubClosed` if the hub has stopped.
    pub async fn handle_payload(&self, payload: &[u8]) -> Result<(), RelayError> {
        self.relay.handle_payload(payload).await
    }
}

impl Relay {
    /// Returns `true` if the subscription ended and should be replaced,
    /// `false` if the relay should stop.
    async fn consume(&self, subscription: &mut Subscription) -> bool {
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => return false,
                next = subscription.next() => match next {
                    Some(payload) => match self.handle_payload(&payload).await {
                        Ok(()) => {}
                        Err(RelayError::HubClosed) => return false,
                        // Only a roster read reaches the store here
                        Err(RelayError::StoreUnavailable(e)) => {
                            warn!(error = %e, "Roster refresh failed");
                            if !self.retry_roster().await {
                                return false;
                            }
                        }
                        Err(e) => warn!(error = %e, "Dropping bus event"),
                    },
                    None => return true,
                },
            }
        }
    }

    async fn resubscribe(&self, backoff: &mut Backoff) -> Option<Subscription> {
        loop {
            let delay = backoff.next_delay();
            debug!(delay_ms = delay.as_millis() as u64, "Resubscribing after delay");
            tokio::select! {
                () = self.shutdown.cancelled() => return None,
                () = tokio::time::sleep(delay) => {}
            }

            match self.broadcast.subscribe().await {
                Ok(subscription) => {
                    backoff.reset();
                    info!(backend = self.broadcast.name(), "Relay resubscribed");
                    match self.refresh_roster().await {
                        Ok(()) => {}
                        Err(RelayError::HubClosed) => return None,
                        Err(e) => {
                            warn!(error = %e, "Roster refresh after resubscribe failed");
                            if !self.retry_roster().await {
                                return None;
                            }
                        }
                    }
                    return Some(subscription);
                }
                Err(e) => warn!(error = %e, "Relay subscribe failed"),
            }
        }
    }

    /// Retry the roster refresh with backoff. Returns `false` on shutdown or
    /// once the hub is gone.
    async fn retry_roster(&self) -> bool {
        let mut backoff = Backoff::from(&self.config);
        loop {
            let delay = backoff.next_delay();
            tokio::select! {
                () = self.shutdown.cancelled() => return false,
                () = tokio::time::sleep(delay) => {}
            }

            match self.refresh_roster().await {
                Ok(()) => return true,
                Err(RelayError::HubClosed) => return false,
                Err(e) => {
                    debug!(error = %e, delay_ms = delay.as_millis() as u64, "Roster refresh still failing");
                }
            }
        }
    }

    async fn handle_payload(&self, payload: &[u8]) -> Result<(), RelayError> {
        match codec::decode_bus(payload)? {
            BusEvent::Message { data } => {
                trace!(sender = %data.sender, "Relaying message");
                self.hub.deliver(ServerEvent::message(data))
            }
            BusEvent::PresenceChanged => self.refresh_roster().await,
        }
    }

    async fn refresh_roster(&self) -> Result<(), RelayError> {
        let members = self.presence.all_members().await?;
        debug!(online = members.len(), "Pushing roster");
        self.hub.deliver(ServerEvent::roster(members))
    }
}
