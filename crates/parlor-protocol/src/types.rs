//! Core protocol types for Parlor's event flow.
//!
//! Every type here is serialized at some point: envelopes are written to
//! the durable mailbox, notifications are handed to the event bus. The JSON
//! field names are fixed (`type`, `userRoom`, `roomId`, ...) because other
//! services share the store and read these values too.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Module name stamped on every notification the coordinator publishes.
pub const GAME_MANAGER_MODULE: &str = "game_manager";

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a user.
///
/// Newtype over `String` so a `UserId` can never be passed where a
/// `RoomId` is expected. `#[serde(transparent)]` keeps the JSON form a plain
/// string: `UserId("alice")` serializes as `"alice"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unique identifier for a room (one game session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The game-type key. Selects the engine and the per-game configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub String);

impl GameId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Room assignment
// ---------------------------------------------------------------------------

/// The part a user plays in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Player,
    Spectator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Player => f.write_str("player"),
            Self::Spectator => f.write_str("spectator"),
        }
    }
}

/// Which room a user is assigned to, and in what role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRoom {
    pub room_id: RoomId,
    pub role: Role,
}

impl UserRoom {
    pub fn player(room_id: RoomId) -> Self {
        Self { room_id, role: Role::Player }
    }

    pub fn spectator(room_id: RoomId) -> Self {
        Self { room_id, role: Role::Spectator }
    }

    pub fn is_player(&self) -> bool {
        self.role == Role::Player
    }
}

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// The closed set of events a room mailbox can carry.
///
/// Gameplay kinds (`Ready`, `Turn`, `Event`, `Spectate`, `Leave`) come from
/// users through the transport. Lifecycle kinds (`Leaved`, `Disconnect`,
/// `Relogin`) are translated from system signals, and `Timeout` is
/// scheduled by the coordinator itself when a turn begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A player is ready to start the round.
    Ready,
    /// A player's move.
    Turn,
    /// Any other in-game action: draw offer, take-back, throw...
    Event,
    /// A user starts watching a room.
    Spectate,
    /// A user asked to leave the room.
    Leave,
    /// The system already removed the user; the room must catch up.
    Leaved,
    /// The user's connection went away.
    Disconnect,
    /// The user logged in again and needs the room snapshot.
    Relogin,
    /// A turn timer fired.
    Timeout,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Turn => "turn",
            Self::Event => "event",
            Self::Spectate => "spectate",
            Self::Leave => "leave",
            Self::Leaved => "leaved",
            Self::Disconnect => "disconnect",
            Self::Relogin => "relogin",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Who produced an envelope: the server itself, or a user.
///
/// On the wire this is a plain string. The literal `"server"` marks a
/// server-originated envelope; anything else is a user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Sender {
    Server,
    User(UserId),
}

const SERVER_SENDER: &str = "server";

impl From<String> for Sender {
    fn from(raw: String) -> Self {
        if raw == SERVER_SENDER {
            Self::Server
        } else {
            Self::User(UserId(raw))
        }
    }
}

impl From<Sender> for String {
    fn from(sender: Sender) -> Self {
        match sender {
            Sender::Server => SERVER_SENDER.to_string(),
            Sender::User(user) => user.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One routed event destined for a specific room's mailbox.
///
/// ```text
/// {
///   "type": "turn",
///   "sender": "alice",
///   "user": "alice",
///   "game": "chess",
///   "userRoom": { "roomId": "r-17", "role": "player" },
///   "data": { "from": "e2", "to": "e4" }
/// }
/// ```
///
/// `userRoom` is empty when the envelope is first built from a user
/// action; the coordinator fills it in while routing, before the envelope is
/// written to the mailbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EventKind,

    pub sender: Sender,

    /// The acting user. Absent for some server-originated events
    /// (scheduled timeouts carry the user inside `data` instead).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserId>,

    pub game: GameId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_room: Option<UserRoom>,

    /// Kind-specific payload. Opaque to the coordinator except for the
    /// reserved turn-control fields and the timeout payload.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Builds an envelope for an action the user performed.
    pub fn from_user(kind: EventKind, game: GameId, user: UserId, data: Value) -> Self {
        Self {
            kind,
            sender: Sender::User(user.clone()),
            user: Some(user),
            game,
            user_room: None,
            data,
        }
    }

    /// Builds a server-originated envelope.
    pub fn from_server(
        kind: EventKind,
        game: GameId,
        user: Option<UserId>,
        user_room: Option<UserRoom>,
        data: Value,
    ) -> Self {
        Self {
            kind,
            sender: Sender::Server,
            user,
            game,
            user_room,
            data,
        }
    }

    pub fn is_from_server(&self) -> bool {
        self.sender == Sender::Server
    }

    /// The room this envelope was routed to, if routing already happened.
    pub fn room_id(&self) -> Option<&RoomId> {
        self.user_room.as_ref().map(|ur| &ur.room_id)
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// An outbound message published through the event bus to a user or to
/// everyone in a room: `{ module, type, data }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub module: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}

impl Notification {
    pub fn new(module: impl Into<String>, kind: impl Into<String>, data: Value) -> Self {
        Self {
            module: module.into(),
            kind: kind.into(),
            data,
        }
    }

    /// A notification from the game manager module.
    pub fn game(kind: impl Into<String>, data: Value) -> Self {
        Self::new(GAME_MANAGER_MODULE, kind, data)
    }
}

// =========================================================================
// Tests
// =========================================================================
