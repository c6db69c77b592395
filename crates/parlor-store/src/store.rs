//! The `RoomStore` trait and the values it exchanges.

use std::future::Future;

use chrono::{DateTime, Utc};
use parlor_protocol::{Envelope, GameId, RoomId, UserId, UserRoom};
use parlor_room::Room;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{MailboxKeys, StoreError};

/// Opaque handle of a user's live connection.
///
/// The coordinator only cares whether one exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionHandle(pub String);

/// Outcome of [`RoomStore::list_dequeue_to_slot`].
#[derive(Debug, Clone, PartialEq)]
pub enum Dequeued {
    /// The list head was moved into the empty slot.
    Fresh(Envelope),
    /// The slot was already occupied. Nothing was popped; this is the
    /// occupant, still owned by whoever put it there.
    InFlight(Envelope),
    /// Both the list and the slot are empty.
    Empty,
}

/// One finished round, written to the game's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    pub game: GameId,
    pub mode: String,
    pub room_id: RoomId,
    pub players: Vec<UserId>,
    pub result: Value,
    pub finished_at: DateTime<Utc>,
}

/// Everything the coordinator needs from durable storage.
///
/// Implementations must be safe to share between coordinator processes:
/// [`list_dequeue_to_slot`](Self::list_dequeue_to_slot) has to be atomic with
/// respect to every other caller of the same mailbox.
pub trait RoomStore: Send + Sync + 'static {
    /// Loads a room snapshot, or `None` if the room does not exist.
    fn load_room(
        &self,
        game: &GameId,
        room: &RoomId,
    ) -> impl Future<Output = Result<Option<Room>, StoreError>> + Send;

    /// Writes a room snapshot, replacing the previous one.
    fn save_room(&self, room: &Room) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// The room and role `user` is assigned to in `game`.
    fn get_user_room(
        &self,
        user: &UserId,
        game: &GameId,
    ) -> impl Future<Output = Result<Option<UserRoom>, StoreError>> + Send;

    /// The user's live connection, if any.
    fn get_user_socket(
        &self,
        game: &GameId,
        user: &UserId,
    ) -> impl Future<Output = Result<Option<ConnectionHandle>, StoreError>> + Send;

    /// Appends an envelope to the tail of a mailbox.
    fn list_append(
        &self,
        keys: &MailboxKeys,
        envelope: &Envelope,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Atomically moves the mailbox head into the in-flight slot.
    ///
    /// Never pops while the slot is occupied.
    fn list_dequeue_to_slot(
        &self,
        keys: &MailboxKeys,
    ) -> impl Future<Output = Result<Dequeued, StoreError>> + Send;

    /// Clears the in-flight slot (acknowledge).
    fn delete_slot(
        &self,
        keys: &MailboxKeys,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Reads the in-flight envelope without touching it.
    fn peek_slot(
        &self,
        keys: &MailboxKeys,
    ) -> impl Future<Output = Result<Option<Envelope>, StoreError>> + Send;

    /// Rooms of `game` whose in-flight slot is occupied.
    fn in_flight_rooms(
        &self,
        game: &GameId,
    ) -> impl Future<Output = Result<Vec<RoomId>, StoreError>> + Send;

    /// Queues a rating recomputation for `user`.
    fn update_user_rating(
        &self,
        game: &GameId,
        mode: &str,
        user: &UserId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Appends a finished round to the game's history.
    fn save_game_record(
        &self,
        record: &GameRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
