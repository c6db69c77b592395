//! The persisted snapshot of one game session.
//!
//! A [`Room`] is loaded from the store at the start of every envelope,
//! mutated by the coordinator and the engine, and saved back afterwards.
//! Nothing keeps a room in memory between envelopes.

use std::collections::BTreeMap;
use std::time::Duration;

use parlor_protocol::{GameId, RoomId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{GameState, RoomError};

/// Per-player counters, reset at the end of every round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub ready: bool,
    pub timeouts: u32,
    pub take_backs: u32,
}

/// One active or recently active game session.
///
/// Invariants (checked by [`Room::check_invariants`]):
/// - `players` has no duplicates;
/// - every player has a `user_data` entry;
/// - while `Playing`, `current_id` is one of `players`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub game: GameId,
    /// Ruleset variant, e.g. "blitz".
    pub mode: String,
    /// Turn order.
    pub players: Vec<UserId>,
    #[serde(default)]
    pub spectators: Vec<UserId>,
    #[serde(default)]
    pub user_data: BTreeMap<UserId, UserData>,
    #[serde(default)]
    pub game_state: GameState,
    #[serde(default)]
    pub current_id: Option<UserId>,
    /// Epoch millis at which the current turn started.
    #[serde(default)]
    pub turn_start_time: Option<i64>,
    /// Per-turn duration. Zero means "use the game's default".
    #[serde(with = "millis")]
    pub timeout: Duration,
    #[serde(default = "enabled")]
    pub save_history: bool,
    #[serde(default = "enabled")]
    pub save_rating: bool,
    /// Engine-maintained score, copied into every round result.
    #[serde(default)]
    pub score: Value,
    /// Engine-owned game data (board, hands, ...). Opaque to the coordinator.
    #[serde(default)]
    pub state: Value,
}

fn enabled() -> bool {
    true
}

impl Room {
    /// Creates a room in `Waiting` with a counter entry for every player.
    ///
    /// # Errors
    /// Returns [`RoomError::DuplicatePlayer`] if a player is listed twice.
    pub fn new(
        id: RoomId,
        game: GameId,
        mode: impl Into<String>,
        players: Vec<UserId>,
        timeout: Duration,
    ) -> Result<Self, RoomError> {
        let mut user_data = BTreeMap::new();
        for player in &players {
            if user_data.insert(player.clone(), UserData::default()).is_some() {
                return Err(RoomError::DuplicatePlayer(player.clone(), id));
            }
        }

        Ok(Self {
            id,
            game,
            mode: mode.into(),
            players,
            spectators: Vec::new(),
            user_data,
            game_state: GameState::Waiting,
            current_id: None,
            turn_start_time: None,
            timeout,
            save_history: true,
            save_rating: true,
            score: Value::Null,
            state: Value::Null,
        })
    }

    pub fn is_waiting(&self) -> bool {
        self.game_state == GameState::Waiting
    }

    pub fn is_playing(&self) -> bool {
        self.game_state == GameState::Playing
    }

    pub fn is_closing(&self) -> bool {
        self.game_state == GameState::Closing
    }

    pub fn has_player(&self, user: &UserId) -> bool {
        self.players.contains(user)
    }

    pub fn has_spectator(&self, user: &UserId) -> bool {
        self.spectators.contains(user)
    }

    /// Moves the room to `target`, enforcing the lifecycle state machine.
    pub fn transition(&mut self, target: GameState) -> Result<(), RoomError> {
        if !self.game_state.can_transition_to(target) {
            return Err(RoomError::InvalidTransition {
                room: self.id.clone(),
                from: self.game_state,
                to: target,
            });
        }
        self.game_state = target;
        Ok(())
    }

    /// Adds a spectator. Returns `false` if the user is already watching
    /// or plays in this room.
    pub fn add_spectator(&mut self, user: UserId) -> bool {
        if self.has_player(&user) || self.has_spectator(&user) {
            return false;
        }
        self.spectators.push(user);
        true
    }

    /// Removes a spectator. Returns `false` if the user was not watching.
    pub fn leave_spectator(&mut self, user: &UserId) -> bool {
        let before = self.spectators.len();
        self.spectators.retain(|s| s != user);
        self.spectators.len() != before
    }

    /// The player after `user` in turn order, wrapping around.
    pub fn next_player(&self, user: &UserId) -> Option<&UserId> {
        let idx = self.players.iter().position(|p| p == user)?;
        self.players.get((idx + 1) % self.players.len())
    }

    /// Starts `user`'s turn at `now_ms` and returns the turn start time.
    ///
    /// The returned time is strictly greater than the previous turn's, so
    /// two turns that begin in the same millisecond still get distinct
    /// start times.
    pub fn begin_turn(&mut self, user: &UserId, now_ms: i64) -> Result<i64, RoomError> {
        if !self.has_player(user) {
            return Err(RoomError::NotAPlayer(user.clone(), self.id.clone()));
        }
        if !self.is_playing() {
            return Err(RoomError::InvalidTransition {
                room: self.id.clone(),
                from: self.game_state,
                to: GameState::Playing,
            });
        }
        let start = match self.turn_start_time {
            Some(prev) if prev >= now_ms => prev + 1,
            _ => now_ms,
        };
        self.current_id = Some(user.clone());
        self.turn_start_time = Some(start);
        Ok(start)
    }

    /// The per-turn duration, falling back to `default` when unset.
    pub fn turn_time(&self, default: Duration) -> Duration {
        if self.timeout.is_zero() {
            default
        } else {
            self.timeout
        }
    }

    // -- Round counters --------------------------------------------------

    fn user_data_mut(&mut self, user: &UserId) -> Result<&mut UserData, RoomError> {
        let room = self.id.clone();
        self.user_data
            .get_mut(user)
            .ok_or_else(|| RoomError::NotAPlayer(user.clone(), room))
    }

    /// Marks a player ready (or not). Returns whether everyone is ready now.
    pub fn set_ready(&mut self, user: &UserId, ready: bool) -> Result<bool, RoomError> {
        self.user_data_mut(user)?.ready = ready;
        Ok(self.all_ready())
    }

    pub fn all_ready(&self) -> bool {
        !self.players.is_empty()
            && self
                .players
                .iter()
                .all(|p| self.user_data.get(p).is_some_and(|d| d.ready))
    }

    /// Counts one more timeout against `user`. Returns the new count.
    pub fn record_timeout(&mut self, user: &UserId) -> Result<u32, RoomError> {
        let data = self.user_data_mut(user)?;
        data.timeouts += 1;
        Ok(data.timeouts)
    }

    /// Counts one more take-back by `user`. Returns the new count.
    pub fn record_take_back(&mut self, user: &UserId) -> Result<u32, RoomError> {
        let data = self.user_data_mut(user)?;
        data.take_backs += 1;
        Ok(data.take_backs)
    }

    /// Resets `ready`, `timeouts`, and `take_backs` for every player.
    pub fn reset_round_counters(&mut self) {
        for player in &self.players {
            self.user_data.insert(player.clone(), UserData::default());
        }
    }

    // -- Invariants ------------------------------------------------------

    /// Checks the structural invariants of a room.
    pub fn check_invariants(&self) -> Result<(), RoomError> {
        let violation = |msg: String| RoomError::InvariantViolation(self.id.clone(), msg);

        for (i, player) in self.players.iter().enumerate() {
            if self.players[..i].contains(player) {
                return Err(RoomError::DuplicatePlayer(player.clone(), self.id.clone()));
            }
            if !self.user_data.contains_key(player) {
                return Err(violation(format!("no user data for player {player}")));
            }
        }

        if self.is_playing() {
            match &self.current_id {
                Some(current) if self.has_player(current) => {}
                Some(current) => {
                    return Err(violation(format!("current player {current} is not in the room")));
                }
                None => return Err(violation("playing without a current player".into())),
            }
        }
        Ok(())
    }

    // -- Snapshots -------------------------------------------------------

    /// Data broadcast with `round_start`.
    pub fn init_data(&self) -> Value {
        json!({
            "roomId": self.id,
            "mode": self.mode,
            "players": self.players,
            "userData": self.user_data,
            "timeout": self.timeout.as_millis() as u64,
            "state": self.state,
        })
    }

    /// Full room snapshot sent to `user` after a relogin (`game_restart`).
    pub fn game_data(&self, user: &UserId) -> Value {
        json!({
            "roomId": self.id,
            "game": self.game,
            "mode": self.mode,
            "players": self.players,
            "spectators": self.spectators,
            "userData": self.user_data,
            "gameState": self.game_state,
            "currentId": self.current_id,
            "turnStartTime": self.turn_start_time,
            "timeout": self.timeout.as_millis() as u64,
            "score": self.score,
            "state": self.state,
            "user": user,
        })
    }
}

/// Serializes a `Duration` as whole milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::new(s)
    }

    fn two_player_room() -> Room {
        Room::new(
            RoomId::new("r-1"),
            GameId::new("chess"),
            "blitz",
            vec![uid("a"), uid("b")],
            Duration::from_secs(10),
        )
        .unwrap()
    }

    #[test]
    fn test_new_creates_user_data_for_every_player() {
        let room = two_player_room();
        assert_eq!(room.user_data.len(), 2);
        assert_eq!(room.game_state, GameState::Waiting);
        room.check_invariants().unwrap();
    }

    #[test]
    fn test_new_rejects_duplicate_players() {
        let result = Room::new(
            RoomId::new("r"),
            GameId::new("g"),
            "m",
            vec![uid("a"), uid("a")],
            Duration::ZERO,
        );
        assert!(matches!(result, Err(RoomError::DuplicatePlayer(..))));
    }

    #[test]
    fn test_leave_spectator_absent_reports_no_effect() {
        let mut room = two_player_room();
        assert!(!room.leave_spectator(&uid("s")));
        assert!(room.add_spectator(uid("s")));
        assert!(room.leave_spectator(&uid("s")));
        assert!(room.spectators.is_empty());
    }

    #[test]
    fn test_add_spectator_rejects_players() {
        let mut room = two_player_room();
        assert!(!room.add_spectator(uid("a")));
    }

    #[test]
    fn test_begin_turn_same_millisecond_still_advances() {
        let mut room = two_player_room();
        room.transition(GameState::Playing).unwrap();
        let t1 = room.begin_turn(&uid("a"), 1_000).unwrap();
        let t2 = room.begin_turn(&uid("b"), 1_000).unwrap();
        assert_eq!(t1, 1_000);
        assert!(t2 > t1);
        assert_eq!(room.current_id, Some(uid("b")));
    }

    #[test]
    fn test_begin_turn_requires_playing_and_player() {
        let mut room = two_player_room();
        assert!(room.begin_turn(&uid("a"), 1).is_err());
        room.transition(GameState::Playing).unwrap();
        assert!(matches!(
            room.begin_turn(&uid("zed"), 1),
            Err(RoomError::NotAPlayer(..))
        ));
    }

    #[test]
    fn test_next_player_wraps() {
        let room = two_player_room();
        assert_eq!(room.next_player(&uid("a")), Some(&uid("b")));
        assert_eq!(room.next_player(&uid("b")), Some(&uid("a")));
        assert_eq!(room.next_player(&uid("x")), None);
    }

    #[test]
    fn test_set_ready_reports_all_ready() {
        let mut room = two_player_room();
        assert!(!room.set_ready(&uid("a"), true).unwrap());
        assert!(room.set_ready(&uid("b"), true).unwrap());
    }

    #[test]
    fn test_reset_round_counters_zeroes_everything() {
        let mut room = two_player_room();
        room.set_ready(&uid("a"), true).unwrap();
        room.record_timeout(&uid("a")).unwrap();
        room.record_take_back(&uid("b")).unwrap();

        room.reset_round_counters();

        for data in room.user_data.values() {
            assert_eq!(data, &UserData::default());
        }
    }

    #[test]
    fn test_check_invariants_playing_without_current() {
        let mut room = two_player_room();
        room.game_state = GameState::Playing;
        assert!(matches!(
            room.check_invariants(),
            Err(RoomError::InvariantViolation(..))
        ));
        room.current_id = Some(uid("ghost"));
        assert!(room.check_invariants().is_err());
        room.current_id = Some(uid("a"));
        room.check_invariants().unwrap();
    }

    #[test]
    fn test_transition_rejects_leaving_closing() {
        let mut room = two_player_room();
        room.transition(GameState::Closing).unwrap();
        assert!(room.transition(GameState::Playing).is_err());
    }

    #[test]
    fn test_turn_time_falls_back_when_zero() {
        let mut room = two_player_room();
        assert_eq!(room.turn_time(Duration::from_secs(30)), Duration::from_secs(10));
        room.timeout = Duration::ZERO;
        assert_eq!(room.turn_time(Duration::from_secs(30)), Duration::from_secs(30));
    }

    #[test]
    fn test_room_json_uses_camel_case_and_millis() {
        let room = two_player_room();
        let value = serde_json::to_value(&room).unwrap();
        assert_eq!(value["timeout"], 10_000);
        assert_eq!(value["gameState"], "waiting");
        assert!(value["userData"]["a"]["takeBacks"].is_number());
        let back: Room = serde_json::from_value(value).unwrap();
        assert_eq!(back, room);
    }
}
