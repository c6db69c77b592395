//! In-process store backed by hash maps.
//!
//! Values are kept as codec-encoded bytes under the same keys the Redis
//! backend uses, so a round trip through `MemoryStore` exercises the same
//! serialization a real deployment does. Single process only: the mutex is
//! what makes dequeue-to-slot atomic here.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parlor_protocol::{Codec, Envelope, GameId, JsonCodec, RoomId, UserId, UserRoom};
use parlor_room::Room;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::keys::{history_key, rating_key, room_key, slot_prefix, user_room_key, user_socket_key};
use crate::{ConnectionHandle, Dequeued, GameRecord, MailboxKeys, RoomStore, StoreError};

/// A [`RoomStore`] that lives in memory.
///
/// Cheap to clone; clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    codec: JsonCodec,
}

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, Vec<u8>>,
    lists: HashMap<String, VecDeque<Vec<u8>>>,
    fail_writes: bool,
}

impl Inner {
    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Backend("writes disabled".into()));
        }
        Ok(())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_opt<T: DeserializeOwned>(
        &self,
        raw: Option<&Vec<u8>>,
    ) -> Result<Option<T>, StoreError> {
        raw.map(|bytes| self.codec.decode(bytes))
            .transpose()
            .map_err(StoreError::from)
    }

    // -- Seeding (room creation, presence) --------------------------------

    /// Stores a room as room-creation logic would.
    pub async fn insert_room(&self, room: &Room) -> Result<(), StoreError> {
        let raw = self.codec.encode(room)?;
        let mut inner = self.inner.lock().await;
        inner.values.insert(room_key(&room.game, &room.id), raw);
        Ok(())
    }

    /// Assigns `user` to a room of `game`.
    pub async fn assign_user(
        &self,
        game: &GameId,
        user: &UserId,
        user_room: &UserRoom,
    ) -> Result<(), StoreError> {
        let raw = self.codec.encode(user_room)?;
        let mut inner = self.inner.lock().await;
        inner.values.insert(user_room_key(game, user), raw);
        Ok(())
    }

    pub async fn unassign_user(&self, game: &GameId, user: &UserId) {
        self.inner.lock().await.values.remove(&user_room_key(game, user));
    }

    /// Records a live connection for `user`.
    pub async fn connect_user(
        &self,
        game: &GameId,
        user: &UserId,
        handle: impl Into<String>,
    ) -> Result<(), StoreError> {
        let raw = self.codec.encode(&ConnectionHandle(handle.into()))?;
        let mut inner = self.inner.lock().await;
        inner.values.insert(user_socket_key(game, user), raw);
        Ok(())
    }

    pub async fn disconnect_user(&self, game: &GameId, user: &UserId) {
        self.inner.lock().await.values.remove(&user_socket_key(game, user));
    }

    /// Makes room saves and record writes fail until switched back.
    pub async fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().await.fail_writes = fail;
    }

    /// Leaves `raw` in the in-flight slot as if a drainer had crashed
    /// mid-envelope. The bytes are not validated.
    pub async fn put_raw_slot(&self, keys: &MailboxKeys, raw: impl Into<Vec<u8>>) {
        self.inner.lock().await.values.insert(keys.slot.clone(), raw.into());
    }

    // -- Inspection -------------------------------------------------------

    /// Envelopes waiting in a mailbox, oldest first.
    pub async fn pending(&self, keys: &MailboxKeys) -> Result<Vec<Envelope>, StoreError> {
        self.decode_list(&keys.list).await
    }

    /// Users queued for a rating update in `game`/`mode`, oldest first.
    pub async fn rating_updates(
        &self,
        game: &GameId,
        mode: &str,
    ) -> Result<Vec<UserId>, StoreError> {
        self.decode_list(&rating_key(game, mode)).await
    }

    /// History records of `game`, oldest first.
    pub async fn game_records(&self, game: &GameId) -> Result<Vec<GameRecord>, StoreError> {
        self.decode_list(&history_key(game)).await
    }

    async fn decode_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, StoreError> {
        let inner = self.inner.lock().await;
        let Some(list) = inner.lists.get(key) else {
            return Ok(Vec::new());
        };
        list.iter()
            .map(|raw| self.codec.decode(raw).map_err(StoreError::from))
            .collect()
    }
}

impl RoomStore for MemoryStore {
    async fn load_room(&self, game: &GameId, room: &RoomId) -> Result<Option<Room>, StoreError> {
        let inner = self.inner.lock().await;
        self.decode_opt(inner.values.get(&room_key(game, room)))
    }

    async fn save_room(&self, room: &Room) -> Result<(), StoreError> {
        let raw = self.codec.encode(room)?;
        let mut inner = self.inner.lock().await;
        inner.check_writable()?;
        inner.values.insert(room_key(&room.game, &room.id), raw);
        Ok(())
    }

    async fn get_user_room(
        &self,
        user: &UserId,
        game: &GameId,
    ) -> Result<Option<UserRoom>, StoreError> {
        let inner = self.inner.lock().await;
        self.decode_opt(inner.values.get(&user_room_key(game, user)))
    }

    async fn get_user_socket(
        &self,
        game: &GameId,
        user: &UserId,
    ) -> Result<Option<ConnectionHandle>, StoreError> {
        let inner = self.inner.lock().await;
        self.decode_opt(inner.values.get(&user_socket_key(game, user)))
    }

    async fn list_append(&self, keys: &MailboxKeys, envelope: &Envelope) -> Result<(), StoreError> {
        let raw = self.codec.encode(envelope)?;
        let mut inner = self.inner.lock().await;
        inner.lists.entry(keys.list.clone()).or_default().push_back(raw);
        Ok(())
    }

    async fn list_dequeue_to_slot(&self, keys: &MailboxKeys) -> Result<Dequeued, StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(occupant) = inner.values.get(&keys.slot) {
            return Ok(Dequeued::InFlight(self.codec.decode(occupant)?));
        }
        let Some(head) = inner.lists.get_mut(&keys.list).and_then(VecDeque::pop_front) else {
            return Ok(Dequeued::Empty);
        };
        // The slot owns the bytes even if they fail to decode, like the
        // Redis script does.
        inner.values.insert(keys.slot.clone(), head.clone());
        Ok(Dequeued::Fresh(self.codec.decode(&head)?))
    }

    async fn delete_slot(&self, keys: &MailboxKeys) -> Result<(), StoreError> {
        self.inner.lock().await.values.remove(&keys.slot);
        Ok(())
    }

    async fn peek_slot(&self, keys: &MailboxKeys) -> Result<Option<Envelope>, StoreError> {
        let inner = self.inner.lock().await;
        self.decode_opt(inner.values.get(&keys.slot))
    }

    async fn in_flight_rooms(&self, game: &GameId) -> Result<Vec<RoomId>, StoreError> {
        let prefix = slot_prefix(game);
        let inner = self.inner.lock().await;
        let mut rooms: Vec<RoomId> = inner
            .values
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .map(RoomId::new)
            .collect();
        rooms.sort();
        Ok(rooms)
    }

    async fn update_user_rating(
        &self,
        game: &GameId,
        mode: &str,
        user: &UserId,
    ) -> Result<(), StoreError> {
        let raw = self.codec.encode(user)?;
        let mut inner = self.inner.lock().await;
        inner.check_writable()?;
        inner.lists.entry(rating_key(game, mode)).or_default().push_back(raw);
        Ok(())
    }

    async fn save_game_record(&self, record: &GameRecord) -> Result<(), StoreError> {
        let raw = self.codec.encode(record)?;
        let mut inner = self.inner.lock().await;
        inner.check_writable()?;
        inner.lists.entry(history_key(&record.game)).or_default().push_back(raw);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use parlor_protocol::EventKind;
    use serde_json::json;

    use super::*;

    fn keys() -> MailboxKeys {
        MailboxKeys::new(&GameId::new("g"), &RoomId::new("r"))
    }

    #[tokio::test]
    async fn test_dequeue_undecodable_head_stays_in_slot() {
        let store = MemoryStore::new();
        store
            .inner
            .lock()
            .await
            .lists
            .entry(keys().list)
            .or_default()
            .push_back(b"not json".to_vec());

        let result = store.list_dequeue_to_slot(&keys()).await;
        assert!(matches!(result, Err(StoreError::Protocol(_))));
        assert!(store.inner.lock().await.values.contains_key(&keys().slot));
    }

    #[tokio::test]
    async fn test_fail_writes_leaves_mailbox_usable() {
        let store = MemoryStore::new();
        store.set_fail_writes(true).await;
        let envelope = Envelope::from_user(
            EventKind::Ready,
            GameId::new("g"),
            UserId::new("a"),
            json!(true),
        );
        store.list_append(&keys(), &envelope).await.unwrap();
        assert!(matches!(
            store.list_dequeue_to_slot(&keys()).await.unwrap(),
            Dequeued::Fresh(_)
        ));
        let record_result = store
            .update_user_rating(&GameId::new("g"), "m", &UserId::new("a"))
            .await;
        assert!(matches!(record_result, Err(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn test_put_raw_slot_listed_but_unreadable() {
        let store = MemoryStore::new();
        store.put_raw_slot(&keys(), b"not json".to_vec()).await;

        let rooms = store.in_flight_rooms(&GameId::new("g")).await.unwrap();
        assert_eq!(rooms, vec![RoomId::new("r")]);
        assert!(matches!(store.peek_slot(&keys()).await, Err(StoreError::Protocol(_))));

        store.delete_slot(&keys()).await.unwrap();
        assert!(store.in_flight_rooms(&GameId::new("g")).await.unwrap().is_empty());
    }
}
