//! # huddle-store
//!
//! Backend abstraction layer for the Huddle chat relay.
//!
//! Every serving process needs two shared services:
//!
//! - **Presence store** - a set of display names currently online
//! - **Broadcast channel** - a single pub/sub topic carrying chat events
//!
//! Both are expressed as traits so the relay is backend-agnostic:
//!
//! - [`MemoryBackend`] - in-process, shared between clones; for tests and
//!   single-process deployments
//! - `RedisBackend` - `SADD`/`SREM`/`SMEMBERS` plus `PUBLISH`/`SUBSCRIBE`
//!   (feature `redis`, on by default)
//!
//! ```rust,ignore
//! use huddle_store::{BroadcastChannel, PresenceStore};
//!
//! async fn join(store: &dyn PresenceStore, bus: &dyn BroadcastChannel) {
//!     store.add("bob").await?;
//!     bus.publish(br#"{"type":"presence"}"#.to_vec().into()).await?;
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryBackend;
pub use traits::{BroadcastChannel, PresenceStore, StoreError, Subscription};

#[cfg(feature = "redis")]
pub use self::redis::{RedisBackend, RedisConfig};
