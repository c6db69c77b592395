//! Per-game configuration and the room lifecycle state machine.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// GameConfig
// ---------------------------------------------------------------------------

/// Configuration for one game type.
///
/// Registered next to the game's engine. Rooms carry their own `timeout`;
/// `turn_timeout` is only used when a room's timeout is zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Fallback per-turn duration.
    pub turn_timeout: Duration,

    /// Whether finished rounds of this game are written to history.
    /// ANDed with the room's own `save_history` flag.
    pub record_history: bool,

    /// Whether finished rounds update player ratings.
    /// ANDed with the room's own `save_rating` flag.
    pub record_rating: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            turn_timeout: Duration::from_secs(30),
            record_history: true,
            record_rating: true,
        }
    }
}

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

/// The lifecycle state of a room.
///
/// ```text
///             RoundStart
///   Waiting ─────────────→ Playing
///      ↑ │                   │ │
///      │ └──────┐   RoundEnd │ │ GameEnd
///      └────────┼────────────┘ │
///               ↓ GameEnd      ↓
///            Closing ←─────────┘
/// ```
///
/// - **Waiting**: players are in the room and exchange `ready`.
/// - **Playing**: a round is running; `current_id` holds whose turn it is.
/// - **Closing**: the game ended or the room failed. Terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameState {
    #[default]
    Waiting,
    Playing,
    Closing,
}

impl GameState {
    /// Returns `true` if transitioning to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Waiting, Self::Playing)
                | (Self::Playing, Self::Waiting)
                | (Self::Waiting, Self::Closing)
                | (Self::Playing, Self::Closing)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Closing
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Playing => write!(f, "playing"),
            Self::Closing => write!(f, "closing"),
        }
    }
}
