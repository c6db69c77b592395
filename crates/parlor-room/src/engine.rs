//! The `GameEngine` trait, the extension point for game rules.
//!
//! One engine is registered per game type. The coordinator calls
//! [`GameEngine::on_message`] once per validated event, with the room
//! already loaded. The engine mutates the room in place and returns the
//! effects (notifications, turn changes, round end...) the coordinator
//! should carry out on its behalf.

use parlor_protocol::{Notification, UserId};
use serde_json::{Value, json};

use crate::{EngineError, Room};

/// The kinds of events an engine is asked to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineEvent {
    Ready,
    Turn,
    Event,
    Leave,
    Timeout,
}

impl std::fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ready => "READY",
            Self::Turn => "TURN",
            Self::Event => "EVENT",
            Self::Leave => "LEAVE",
            Self::Timeout => "TIMEOUT",
        };
        f.write_str(name)
    }
}

/// Something the engine wants the coordinator to do after it returns.
///
/// Effects are applied in order, before the room is saved.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEffect {
    /// Broadcast to everyone in the room.
    SendInRoom(Notification),
    /// Send to one user.
    SendToUser(UserId, Notification),
    /// Start the round: the room moves to `Playing` and `round_start` is
    /// broadcast with the room's init data.
    RoundStart,
    /// Hand the turn to `user` and arm its turn timer.
    StartTurn { user: UserId },
    /// Finish the round with `result`; `players` get a rating update.
    RoundEnd { result: Value, players: Vec<UserId> },
    /// Tell the room that `user` left.
    UserLeft(UserId),
    /// Close the room for good.
    GameEnd,
}

/// The trait each game type implements.
///
/// Every hook has a default that gives a playable turn-rotation game, so a
/// new game only overrides what its rules change. Engines must only touch
/// the room they are given.
///
/// Hooks are synchronous and cannot await I/O. An engine describes what
/// should happen through the returned [`EngineEffect`]s and the coordinator
/// performs every store write and publish.
///
/// ```rust
/// use parlor_protocol::UserId;
/// use parlor_room::{EngineEffect, EngineError, GameEngine, Room};
/// use serde_json::Value;
///
/// /// Every turn scores a point; first to three wins.
/// struct FirstToThree;
///
/// impl GameEngine for FirstToThree {
///     fn on_turn(
///         &self,
///         room: &mut Room,
///         user: &UserId,
///         _turn: &Value,
///     ) -> Result<Vec<EngineEffect>, EngineError> {
///         let points = room.state[user.as_str()].as_u64().unwrap_or(0) + 1;
///         room.state[user.as_str()] = points.into();
///         if points >= 3 {
///             let result = serde_json::json!({ "winner": user });
///             return Ok(vec![EngineEffect::RoundEnd { result, players: room.players.clone() }]);
///         }
///         let next = room.next_player(user).cloned().unwrap_or_else(|| user.clone());
///         Ok(vec![EngineEffect::StartTurn { user: next }])
///     }
/// }
/// ```
pub trait GameEngine: Send + Sync + 'static {
    /// Dispatches an event to the matching hook.
    ///
    /// This is what the coordinator calls. Override the individual hooks
    /// rather than this method.
    fn on_message(
        &self,
        event: EngineEvent,
        room: &mut Room,
        user: &UserId,
        payload: &Value,
    ) -> Result<Vec<EngineEffect>, EngineError> {
        match event {
            EngineEvent::Ready => self.on_ready(room, user, payload),
            EngineEvent::Turn => self.on_turn(room, user, payload),
            EngineEvent::Event => self.on_event(room, user, payload),
            EngineEvent::Leave => self.on_leave(room, user),
            EngineEvent::Timeout => self.on_timeout(room, user, payload),
        }
    }

    /// A player declared (un)ready. `payload` is the ready flag; anything
    /// other than `false` counts as ready.
    ///
    /// Default: record the flag, broadcast `ready`, and once every player
    /// is ready start the round with the first player's turn.
    fn on_ready(
        &self,
        room: &mut Room,
        user: &UserId,
        payload: &Value,
    ) -> Result<Vec<EngineEffect>, EngineError> {
        let ready = payload.as_bool().unwrap_or(true);
        let all_ready = room.set_ready(user, ready)?;
        let mut effects = vec![EngineEffect::SendInRoom(Notification::game(
            "ready",
            json!({ "user": user, "ready": ready }),
        ))];
        if all_ready {
            if let Some(first) = room.players.first().cloned() {
                effects.push(EngineEffect::RoundStart);
                effects.push(EngineEffect::StartTurn { user: first });
            }
        }
        Ok(effects)
    }

    /// The current player moved. Reserved control fields are already
    /// stripped from `turn`.
    ///
    /// Default: broadcast the turn and pass to the next player.
    fn on_turn(
        &self,
        room: &mut Room,
        user: &UserId,
        turn: &Value,
    ) -> Result<Vec<EngineEffect>, EngineError> {
        let mut effects = vec![EngineEffect::SendInRoom(Notification::game(
            "turn",
            json!({ "user": user, "turn": turn }),
        ))];
        if let Some(next) = room.next_player(user).cloned() {
            effects.push(EngineEffect::StartTurn { user: next });
        }
        Ok(effects)
    }

    /// Any other in-game action. `event` always has a `type` field.
    ///
    /// Default: broadcast it.
    fn on_event(
        &self,
        _room: &mut Room,
        user: &UserId,
        event: &Value,
    ) -> Result<Vec<EngineEffect>, EngineError> {
        Ok(vec![EngineEffect::SendInRoom(Notification::game(
            "event",
            json!({ "user": user, "event": event }),
        ))])
    }

    /// A player left the room.
    ///
    /// Default: announce it and close the room.
    fn on_leave(&self, _room: &mut Room, user: &UserId) -> Result<Vec<EngineEffect>, EngineError> {
        Ok(vec![EngineEffect::UserLeft(user.clone()), EngineEffect::GameEnd])
    }

    /// The current player's turn timer fired. `timeout.online` tells
    /// whether the player still has a live connection.
    ///
    /// Default: announce the timeout and pass to the next player.
    fn on_timeout(
        &self,
        room: &mut Room,
        user: &UserId,
        timeout: &Value,
    ) -> Result<Vec<EngineEffect>, EngineError> {
        let mut effects = vec![EngineEffect::SendInRoom(Notification::game(
            "timeout",
            json!({ "user": user, "online": timeout["online"] }),
        ))];
        if let Some(next) = room.next_player(user).cloned() {
            effects.push(EngineEffect::StartTurn { user: next });
        }
        Ok(effects)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parlor_protocol::{GameId, RoomId};

    use super::*;
    use crate::GameState;

    struct Defaults;
    impl GameEngine for Defaults {}

    fn room() -> Room {
        Room::new(
            RoomId::new("r"),
            GameId::new("g"),
            "m",
            vec![UserId::new("a"), UserId::new("b")],
            Duration::ZERO,
        )
        .unwrap()
    }

    #[test]
    fn test_default_ready_starts_round_when_all_ready() {
        let mut room = room();
        let a = UserId::new("a");
        let b = UserId::new("b");

        let first = Defaults
            .on_message(EngineEvent::Ready, &mut room, &a, &Value::Bool(true))
            .unwrap();
        assert_eq!(first.len(), 1);

        let second = Defaults
            .on_message(EngineEvent::Ready, &mut room, &b, &Value::Null)
            .unwrap();
        assert!(second.contains(&EngineEffect::RoundStart));
        assert!(second.contains(&EngineEffect::StartTurn { user: a }));
        // The engine leaves the state change to the coordinator.
        assert_eq!(room.game_state, GameState::Waiting);
    }

    #[test]
    fn test_default_ready_unknown_user_is_rejected() {
        let mut room = room();
        let result = Defaults.on_ready(&mut room, &UserId::new("zed"), &Value::Null);
        assert!(matches!(result, Err(EngineError::Rejected(_))));
    }

    #[test]
    fn test_default_turn_passes_to_next_player() {
        let mut room = room();
        let effects = Defaults
            .on_turn(&mut room, &UserId::new("b"), &json!({"x": 1}))
            .unwrap();
        assert_eq!(
            effects.last(),
            Some(&EngineEffect::StartTurn { user: UserId::new("a") })
        );
    }

    #[test]
    fn test_default_leave_ends_game() {
        let mut room = room();
        let effects = Defaults.on_leave(&mut room, &UserId::new("a")).unwrap();
        assert_eq!(effects.last(), Some(&EngineEffect::GameEnd));
    }

    #[test]
    fn test_engine_event_display() {
        assert_eq!(EngineEvent::Timeout.to_string(), "TIMEOUT");
    }
}
