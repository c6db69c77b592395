//! Carrying out engine effects, and everything that happens when a round
//! ends.

use std::sync::Arc;

use chrono::Utc;
use parlor_protocol::{Envelope, EventKind, UserId, UserRoom};
use parlor_room::{EngineEffect, GameState, RegisteredGame, Room};
use parlor_store::{GameRecord, RoomStore};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::{Coordinator, EventBus, ParlorError};

impl<S: RoomStore, B: EventBus> Coordinator<S, B> {
    /// Applies effects in the order the engine returned them.
    pub(crate) async fn apply_effects(
        &self,
        registered: &RegisteredGame,
        room: &mut Room,
        effects: Vec<EngineEffect>,
    ) -> Result<(), ParlorError> {
        let bus = &self.shared.bus;
        for effect in effects {
            match effect {
                EngineEffect::SendInRoom(notification) => {
                    bus.send_in_room(&room.game, &room.id, &notification).await?;
                }
                EngineEffect::SendToUser(user, notification) => {
                    bus.send_to_user(&room.game, &user, &notification).await?;
                }
                EngineEffect::RoundStart => {
                    room.transition(GameState::Playing)?;
                    let notification = self.notification("round_start", room.init_data());
                    bus.send_in_room(&room.game, &room.id, &notification).await?;
                    info!(
                        game = %room.game,
                        room_id = %room.id,
                        players = room.players.len(),
                        "round started"
                    );
                }
                EngineEffect::StartTurn { user } => self.start_turn(registered, room, &user)?,
                EngineEffect::RoundEnd { result, players } => {
                    self.end_round(registered, room, result, players).await?;
                }
                EngineEffect::UserLeft(user) => {
                    let notification = self.notification("user_leave", json!(user));
                    bus.send_in_room(&room.game, &room.id, &notification).await?;
                }
                EngineEffect::GameEnd => self.end_game(room).await?,
            }
        }
        Ok(())
    }

    /// Finishes a round: records it, tells the room, sends offline players
    /// out, and puts the room back to `Waiting`.
    ///
    /// Rating updates are written only when both the room's `save_rating`
    /// and the game's `record_rating` are set. The history record likewise
    /// needs `save_history` and `record_history`. The effective flags are
    /// reported as `saveRating`/`saveHistory` in the result.
    async fn end_round(
        &self,
        registered: &RegisteredGame,
        room: &mut Room,
        result: Value,
        players: Vec<UserId>,
    ) -> Result<(), ParlorError> {
        let save_history = room.save_history && registered.config.record_history;
        let save_rating = room.save_rating && registered.config.record_rating;

        let mut result = match result {
            Value::Object(fields) => fields,
            other => {
                let mut fields = Map::new();
                fields.insert("result".into(), other);
                fields
            }
        };
        result.insert("score".into(), room.score.clone());
        result.insert("saveHistory".into(), Value::Bool(save_history));
        result.insert("saveRating".into(), Value::Bool(save_rating));
        let result = Value::Object(result);

        room.reset_round_counters();

        if save_rating {
            self.spawn_rating_updates(room, players.clone());
        }
        if save_history {
            self.spawn_history_record(GameRecord {
                game: room.game.clone(),
                mode: room.mode.clone(),
                room_id: room.id.clone(),
                players: room.players.clone(),
                result: result.clone(),
                finished_at: Utc::now(),
            });
        }

        let notification = self.notification("round_end", result);
        self.shared
            .bus
            .send_in_room(&room.game, &room.id, &notification)
            .await?;

        for player in &room.players {
            if self.shared.store.get_user_socket(&room.game, player).await?.is_some() {
                continue;
            }
            debug!(
                game = %room.game,
                room_id = %room.id,
                user = %player,
                "player offline at round end, leaving"
            );
            let leave = Envelope::from_server(
                EventKind::Leave,
                room.game.clone(),
                Some(player.clone()),
                Some(UserRoom::player(room.id.clone())),
                Value::Null,
            );
            self.enqueue(&room.game, &room.id, leave).await?;
        }

        if room.is_playing() {
            room.transition(GameState::Waiting)?;
        }
        room.current_id = None;
        info!(game = %room.game, room_id = %room.id, save_history, save_rating, "round ended");
        Ok(())
    }

    async fn end_game(&self, room: &mut Room) -> Result<(), ParlorError> {
        if !room.is_closing() {
            room.transition(GameState::Closing)?;
        }
        room.current_id = None;
        let bus = &self.shared.bus;
        bus.close_room(&room.game, &room.id).await?;
        for player in &room.players {
            bus.user_leave_room(&room.game, player, &room.id).await?;
        }
        info!(game = %room.game, room_id = %room.id, "game ended, room closing");
        Ok(())
    }

    // Records are written off the drain path; a failure never fails the room.

    fn spawn_rating_updates(&self, room: &Room, players: Vec<UserId>) {
        let shared = Arc::clone(&self.shared);
        let game = room.game.clone();
        let mode = room.mode.clone();
        tokio::spawn(async move {
            for user in players {
                if let Err(e) = shared.store.update_user_rating(&game, &mode, &user).await {
                    warn!(%game, %mode, %user, error = %e, "rating update failed");
                }
            }
        });
    }

    fn spawn_history_record(&self, record: GameRecord) {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            if let Err(e) = shared.store.save_game_record(&record).await {
                warn!(
                    game = %record.game,
                    room_id = %record.room_id,
                    error = %e,
                    "history record failed"
                );
            }
        });
    }
}
