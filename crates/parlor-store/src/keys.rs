//! Key layout shared by every backend.
//!
//! - `game_room:{game}:{room}`: room snapshot (JSON)
//! - `user_room:{game}:{user}`: the user's room assignment (JSON)
//! - `user_socket:{game}:{user}`: the user's live connection handle
//! - `game_events_list:{game}:{room}`: pending envelopes, oldest first
//! - `game_events_current:{game}:{room}`: the in-flight envelope
//! - `rating_updates:{game}:{mode}`: users awaiting a rating update
//! - `game_history:{game}`: finished-round records (JSON)

use parlor_protocol::{GameId, RoomId, UserId};

const LIST_PREFIX: &str = "game_events_list";
const SLOT_PREFIX: &str = "game_events_current";

/// The two keys that make up one room's mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MailboxKeys {
    pub game: GameId,
    pub room: RoomId,
    /// Pending envelopes.
    pub list: String,
    /// The in-flight envelope.
    pub slot: String,
}

impl MailboxKeys {
    pub fn new(game: &GameId, room: &RoomId) -> Self {
        Self {
            game: game.clone(),
            room: room.clone(),
            list: format!("{LIST_PREFIX}:{game}:{room}"),
            slot: format!("{SLOT_PREFIX}:{game}:{room}"),
        }
    }
}

pub(crate) fn room_key(game: &GameId, room: &RoomId) -> String {
    format!("game_room:{game}:{room}")
}

pub(crate) fn user_room_key(game: &GameId, user: &UserId) -> String {
    format!("user_room:{game}:{user}")
}

pub(crate) fn user_socket_key(game: &GameId, user: &UserId) -> String {
    format!("user_socket:{game}:{user}")
}

pub(crate) fn rating_key(game: &GameId, mode: &str) -> String {
    format!("rating_updates:{game}:{mode}")
}

pub(crate) fn history_key(game: &GameId) -> String {
    format!("game_history:{game}")
}

/// Prefix shared by every in-flight slot of `game`.
pub(crate) fn slot_prefix(game: &GameId) -> String {
    format!("{SLOT_PREFIX}:{game}:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailbox_keys_layout() {
        let keys = MailboxKeys::new(&GameId::new("chess"), &RoomId::new("r-1"));
        assert_eq!(keys.list, "game_events_list:chess:r-1");
        assert_eq!(keys.slot, "game_events_current:chess:r-1");
        assert!(keys.slot.starts_with(&slot_prefix(&GameId::new("chess"))));
    }

    #[test]
    fn test_lookup_keys_are_scoped_by_game() {
        let user = UserId::new("alice");
        assert_ne!(
            user_room_key(&GameId::new("chess"), &user),
            user_room_key(&GameId::new("go"), &user)
        );
        assert_eq!(user_socket_key(&GameId::new("go"), &user), "user_socket:go:alice");
    }
}
