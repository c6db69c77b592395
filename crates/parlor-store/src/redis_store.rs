//! Redis-backed store.
//!
//! Every value is a plain string key (see [`crate::keys`] for the layout).
//! Dequeue-to-slot runs as one Lua script, so it is atomic across every
//! coordinator process sharing the Redis instance.
//!
//! The `MultiplexedConnection` is cheap to clone and safe to use from many
//! tasks at once; each call clones it instead of locking.

use parlor_protocol::{Codec, Envelope, GameId, JsonCodec, RoomId, UserId, UserRoom};
use parlor_room::Room;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError, Script};
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument, warn};

use crate::keys::{history_key, rating_key, room_key, slot_prefix, user_room_key, user_socket_key};
use crate::{ConnectionHandle, Dequeued, GameRecord, MailboxKeys, RoomStore, StoreError};

/// Moves the list head into the in-flight slot unless the slot is occupied.
///
/// Arguments:
/// - KEYS[1]: in-flight slot (e.g. `game_events_current:{game}:{room}`)
/// - KEYS[2]: pending list (e.g. `game_events_list:{game}:{room}`)
///
/// Returns `{status, envelope}`:
/// - `{0, ''}`: list and slot both empty
/// - `{1, occupant}`: slot already occupied, nothing popped
/// - `{2, head}`: head popped and stored in the slot
const DEQUEUE_TO_SLOT: &str = r#"
local occupant = redis.call('GET', KEYS[1])
if occupant then
    return {1, occupant}
end

local head = redis.call('LPOP', KEYS[2])
if not head then
    return {0, ''}
end

redis.call('SET', KEYS[1], head)
return {2, head}
"#;

const STATUS_EMPTY: i64 = 0;
const STATUS_IN_FLIGHT: i64 = 1;
const STATUS_FRESH: i64 = 2;

/// A [`RoomStore`] on Redis.
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
    dequeue_script: Script,
    codec: JsonCodec,
}

impl RedisStore {
    /// Connects to Redis.
    ///
    /// # Errors
    /// Returns `StoreError::Backend` if the client cannot be opened or the
    /// connection fails.
    pub async fn new(redis_url: &str) -> Result<Self, StoreError> {
        // The URL may carry credentials; never log it.
        let client = Client::open(redis_url).map_err(|e| {
            error!(target: "parlor.store.redis", error = %e, "failed to open Redis client");
            StoreError::Backend(format!("failed to open Redis client: {e}"))
        })?;

        let connection = client.get_multiplexed_async_connection().await.map_err(|e| {
            error!(target: "parlor.store.redis", error = %e, "failed to connect to Redis");
            StoreError::Backend(format!("failed to connect to Redis: {e}"))
        })?;

        Ok(Self {
            connection,
            dequeue_script: Script::new(DEQUEUE_TO_SLOT),
            codec: JsonCodec,
        })
    }

    async fn get_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let mut conn = self.connection.clone();
        let raw: Option<Vec<u8>> = conn.get(key).await.map_err(backend("GET", key))?;
        raw.map(|bytes| self.codec.decode(&bytes))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn set_value(&self, key: &str, raw: Vec<u8>) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(key, raw).await.map_err(backend("SET", key))
    }

    async fn push_value(&self, key: &str, raw: Vec<u8>) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        conn.rpush::<_, _, ()>(key, raw).await.map_err(backend("RPUSH", key))
    }
}

fn backend(command: &'static str, key: &str) -> impl FnOnce(RedisError) -> StoreError {
    let key = key.to_string();
    move |e| {
        warn!(
            target: "parlor.store.redis",
            error = %e,
            command,
            key = %key,
            "Redis command failed"
        );
        StoreError::Backend(format!("{command} {key}: {e}"))
    }
}

/// Interprets the reply of [`DEQUEUE_TO_SLOT`].
fn dequeued_from_reply(
    codec: &JsonCodec,
    slot: &str,
    status: i64,
    payload: &[u8],
) -> Result<Dequeued, StoreError> {
    match status {
        STATUS_EMPTY => Ok(Dequeued::Empty),
        STATUS_IN_FLIGHT => Ok(Dequeued::InFlight(codec.decode(payload)?)),
        STATUS_FRESH => Ok(Dequeued::Fresh(codec.decode(payload)?)),
        other => Err(StoreError::UnexpectedReply {
            key: slot.to_string(),
            reason: format!("unknown dequeue status {other}"),
        }),
    }
}

impl RoomStore for RedisStore {
    #[instrument(skip_all, fields(game = %game, room_id = %room))]
    async fn load_room(&self, game: &GameId, room: &RoomId) -> Result<Option<Room>, StoreError> {
        self.get_value(&room_key(game, room)).await
    }

    #[instrument(skip_all, fields(game = %room.game, room_id = %room.id))]
    async fn save_room(&self, room: &Room) -> Result<(), StoreError> {
        let raw = self.codec.encode(room)?;
        self.set_value(&room_key(&room.game, &room.id), raw).await
    }

    async fn get_user_room(
        &self,
        user: &UserId,
        game: &GameId,
    ) -> Result<Option<UserRoom>, StoreError> {
        self.get_value(&user_room_key(game, user)).await
    }

    async fn get_user_socket(
        &self,
        game: &GameId,
        user: &UserId,
    ) -> Result<Option<ConnectionHandle>, StoreError> {
        // Sockets are written by the transport as plain ids, not JSON.
        let key = user_socket_key(game, user);
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(&key).await.map_err(backend("GET", &key))?;
        Ok(raw.filter(|id| !id.is_empty()).map(ConnectionHandle))
    }

    async fn list_append(&self, keys: &MailboxKeys, envelope: &Envelope) -> Result<(), StoreError> {
        let raw = self.codec.encode(envelope)?;
        self.push_value(&keys.list, raw).await
    }

    #[instrument(skip_all, fields(game = %keys.game, room_id = %keys.room))]
    async fn list_dequeue_to_slot(&self, keys: &MailboxKeys) -> Result<Dequeued, StoreError> {
        let mut conn = self.connection.clone();
        let (status, payload): (i64, Vec<u8>) = self
            .dequeue_script
            .key(&keys.slot)
            .key(&keys.list)
            .invoke_async(&mut conn)
            .await
            .map_err(backend("EVALSHA", &keys.slot))?;

        debug!(target: "parlor.store.redis", status, "dequeue to slot");
        dequeued_from_reply(&self.codec, &keys.slot, status, &payload)
    }

    async fn delete_slot(&self, keys: &MailboxKeys) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(&keys.slot).await.map_err(backend("DEL", &keys.slot))
    }

    async fn peek_slot(&self, keys: &MailboxKeys) -> Result<Option<Envelope>, StoreError> {
        self.get_value(&keys.slot).await
    }

    async fn in_flight_rooms(&self, game: &GameId) -> Result<Vec<RoomId>, StoreError> {
        // KEYS blocks the server; this only runs during reconciliation.
        let prefix = slot_prefix(game);
        let pattern = format!("{prefix}*");
        let mut conn = self.connection.clone();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(&pattern)
            .query_async(&mut conn)
            .await
            .map_err(backend("KEYS", &pattern))?;

        let mut rooms: Vec<RoomId> = keys
            .iter()
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
        self.push_value(&rating_key(game, mode), raw).await
    }

    async fn save_game_record(&self, record: &GameRecord) -> Result<(), StoreError> {
        let raw = self.codec.encode(record)?;
        self.push_value(&history_key(&record.game), raw).await
    }
}
