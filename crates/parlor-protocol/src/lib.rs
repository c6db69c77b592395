//! Event protocol for Parlor.
//!
//! This crate defines what flows through the coordinator:
//!
//! - **Types** ([`Envelope`], [`EventKind`], [`UserRoom`], [`Notification`]):
//!   the units placed on a room's mailbox and the notifications published
//!   back to users and rooms.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how envelopes are turned
//!   into bytes for the durable mailbox and back.
//! - **Errors** ([`ProtocolError`]): what can go wrong while encoding or
//!   decoding.
//!
//! # Architecture
//!
//! The protocol layer knows nothing about rooms, stores, or engines. It only
//! describes the shape of an event and how to serialize it.
//!
//! ```text
//! Event Bus (signals) → Protocol (Envelope) → Mailbox (bytes) → Coordinator
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    EventKind, Envelope, GameId, Notification, Role, RoomId, Sender, UserId,
    UserRoom, GAME_MANAGER_MODULE,
};
