//! Durable storage for Parlor.
//!
//! This crate defines what the coordinator needs from its external store:
//!
//! 1. **Rooms**: load and save [`Room`](parlor_room::Room) snapshots
//! 2. **Lookups**: which room a user is in, and whether they are connected
//! 3. **Mailboxes**: one ordered list plus one in-flight slot per room
//! 4. **Records**: rating updates and finished-round history
//!
//! # How it fits in the stack
//!
//! ```text
//! Coordinator (above)  ← drains mailboxes, loads and saves rooms
//!     ↕
//! Store Layer (this crate)  ← RoomStore trait, MemoryStore, RedisStore
//!     ↕
//! Room + Protocol Layers (below)  ← Room, Envelope, JsonCodec
//! ```
//!
//! Several coordinator processes may share one store. The mailbox's
//! dequeue-to-slot operation is atomic in every backend, which is what keeps
//! at most one envelope per room in flight across all of them.

#![allow(async_fn_in_trait)]

mod error;
mod keys;
mod memory;
#[cfg(feature = "redis")]
mod redis_store;
mod store;

pub use error::StoreError;
pub use keys::MailboxKeys;
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use store::{ConnectionHandle, Dequeued, GameRecord, RoomStore};
