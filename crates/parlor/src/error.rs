//! Unified error type for the coordinator.

use parlor_protocol::{EventKind, GameId, ProtocolError, UserId};
use parlor_room::{EngineError, RoomError};
use parlor_store::StoreError;

use crate::BusError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
///
/// Apart from [`Unrouted`](Self::Unrouted), every variant raised while
/// processing an envelope is fatal for that envelope's room.
#[derive(Debug, thiserror::Error)]
pub enum ParlorError {
    /// The envelope's room could not be resolved (no assignment found).
    #[error("no room for {kind} from {user:?} in game {game}")]
    Unrouted {
        kind: EventKind,
        game: GameId,
        user: Option<UserId>,
    },

    /// A malformed envelope or an encode/decode failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room-level error (missing room, invariant violation, bad transition).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The game engine rejected the event.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The room store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The event bus failed.
    #[error(transparent)]
    Bus(#[from] BusError),
}

impl ParlorError {
    /// `true` for routing failures, which drop the envelope without
    /// touching any room.
    pub fn is_routing(&self) -> bool {
        matches!(self, Self::Unrouted { .. })
    }
}
