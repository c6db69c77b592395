//! Error types for the room layer.

use parlor_protocol::{GameId, RoomId, UserId};

use crate::GameState;

/// Errors that can occur while loading, validating, or mutating a room.
///
/// Every variant except `NotFound` for a timeout is fatal for the room it
/// concerns: the coordinator publishes a close-room signal and moves on.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room is expected to exist but the store has no such room.
    #[error("room {1} of game {0} not found")]
    NotFound(GameId, RoomId),

    /// No engine is registered for this game.
    #[error("no engine registered for game {0}")]
    UnknownGame(GameId),

    /// The user is not one of the room's players.
    #[error("user {0} is not a player in room {1}")]
    NotAPlayer(UserId, RoomId),

    /// A player appears twice in the player list.
    #[error("user {0} listed twice in room {1}")]
    DuplicatePlayer(UserId, RoomId),

    /// The requested lifecycle transition is not allowed.
    #[error("room {room}: cannot go from {from} to {to}")]
    InvalidTransition {
        room: RoomId,
        from: GameState,
        to: GameState,
    },

    /// The room's data broke one of its invariants (e.g. the current
    /// player is not in the player list while playing).
    #[error("room {0} invariant violated: {1}")]
    InvariantViolation(RoomId, String),

    /// The game engine rejected the event.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Errors returned by a [`GameEngine`](crate::GameEngine).
///
/// The coordinator treats any engine error as fatal for the room.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine refused to apply the event.
    #[error("engine rejected event: {0}")]
    Rejected(String),

    /// The payload could not be interpreted by the engine.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl From<RoomError> for EngineError {
    fn from(err: RoomError) -> Self {
        Self::Rejected(err.to_string())
    }
}
