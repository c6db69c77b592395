//! Turn timers: arming them when a turn starts and judging them when they
//! come back through the room's mailbox.

use chrono::Utc;
use parlor_protocol::{Envelope, EventKind, RoomId, UserId, UserRoom};
use parlor_room::{EngineEffect, EngineEvent, RegisteredGame, Room};
use parlor_store::RoomStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::{Coordinator, EventBus, ParlorError};

/// Data carried by a `timeout` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutPayload {
    /// Start time of the turn the timer was armed for.
    pub turn_start_time: i64,
    pub user_id: UserId,
    pub room_id: RoomId,
}

impl<S: RoomStore, B: EventBus> Coordinator<S, B> {
    /// Hands the turn to `user` and arms a timer for it.
    ///
    /// The timer comes back as a `timeout` envelope routed to this room, so
    /// it is ordered with every other event of the room.
    pub(crate) fn start_turn(
        &self,
        registered: &RegisteredGame,
        room: &mut Room,
        user: &UserId,
    ) -> Result<(), ParlorError> {
        let turn_start_time = room.begin_turn(user, Utc::now().timestamp_millis())?;
        let payload = TimeoutPayload {
            turn_start_time,
            user_id: user.clone(),
            room_id: room.id.clone(),
        };
        let data = serde_json::to_value(&payload).map_err(parlor_protocol::ProtocolError::Encode)?;
        let envelope = Envelope::from_server(
            EventKind::Timeout,
            room.game.clone(),
            None,
            Some(UserRoom::player(room.id.clone())),
            data,
        );

        let delay = self
            .shared
            .timer
            .schedule(room.turn_time(registered.config.turn_timeout), envelope);
        debug!(
            game = %room.game,
            room_id = %room.id,
            %user,
            turn_start_time,
            delay_ms = delay.as_millis() as u64,
            "turn started"
        );
        Ok(())
    }

    /// Judges a fired turn timer against the room's current turn.
    ///
    /// Only a timer armed for the turn still in progress counts; anything
    /// else is stale and dropped.
    pub(crate) async fn on_timeout(
        &self,
        registered: &RegisteredGame,
        room: &mut Room,
        envelope: &Envelope,
    ) -> Result<Vec<EngineEffect>, ParlorError> {
        if !room.is_playing() {
            debug!(
                game = %room.game,
                room_id = %room.id,
                state = %room.game_state,
                "timeout outside a round"
            );
            return Ok(Vec::new());
        }
        let payload: TimeoutPayload = match serde_json::from_value(envelope.data.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    game = %room.game,
                    room_id = %room.id,
                    error = %e,
                    "malformed timeout payload, dropped"
                );
                return Ok(Vec::new());
            }
        };
        if room.turn_start_time != Some(payload.turn_start_time)
            || room.current_id.as_ref() != Some(&payload.user_id)
        {
            debug!(
                game = %room.game,
                room_id = %room.id,
                fired_for = payload.turn_start_time,
                current = ?room.turn_start_time,
                "stale timeout"
            );
            return Ok(Vec::new());
        }

        let user = payload.user_id;
        let timeouts = room.record_timeout(&user)?;
        let online = self.shared.store.get_user_socket(&room.game, &user).await?.is_some();
        debug!(game = %room.game, room_id = %room.id, %user, timeouts, online, "turn timed out");

        let data = json!({
            "turnStartTime": payload.turn_start_time,
            "userId": user,
            "roomId": payload.room_id,
            "online": online,
            "timeouts": timeouts,
        });
        Ok(registered
            .engine
            .on_message(EngineEvent::Timeout, room, &user, &data)?)
    }
}
