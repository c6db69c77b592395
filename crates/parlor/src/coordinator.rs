//! The room event coordinator.
//!
//! Every envelope goes through the same pipeline:
//!
//! ```text
//! submit ─→ route (resolve room + role) ─→ enqueue (append + wake)
//!                                                │
//!      drain: dequeue-to-slot ─→ process ─→ acknowledge ─→ repeat until empty
//!                                   │
//!             load room ─→ per-kind handler ─→ engine ─→ effects ─→ save room
//! ```
//!
//! Ordering and mutual exclusion per room come from the mailbox alone: a
//! drain that finds the in-flight slot occupied backs off, because someone
//! else (possibly another process) is working on that room and will pick up
//! whatever was appended after it.

use std::sync::Arc;

use parlor_protocol::{
    Envelope, EventKind, GameId, Notification, ProtocolError, RoomId, UserId, UserRoom,
};
use parlor_room::{EngineEffect, EngineEvent, EngineRegistry, RegisteredGame, Room, RoomError};
use parlor_store::{Dequeued, MailboxKeys, RoomStore};
use parlor_timer::{TimerMetrics, TurnTimer};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::{CoordinatorConfig, DrainWorker, EventBus, ParlorError};

/// Turn payload fields only the coordinator may set.
pub const RESERVED_TURN_FIELDS: [&str; 4] = ["action", "type", "nextPlayer", "userTurnTime"];

/// State shared by every clone of a coordinator and its worker.
pub(crate) struct Shared<S, B> {
    pub(crate) store: S,
    pub(crate) bus: B,
    pub(crate) engines: EngineRegistry,
    pub(crate) config: CoordinatorConfig,
    pub(crate) timer: TurnTimer<Envelope>,
    wakes: mpsc::UnboundedSender<MailboxKeys>,
}

/// Routes envelopes into per-room mailboxes and drains them.
///
/// Cheap to clone. Drains are run by the [`DrainWorker`] returned from
/// [`Coordinator::new`]; without a running worker, envelopes are stored but
/// never processed.
pub struct Coordinator<S, B> {
    pub(crate) shared: Arc<Shared<S, B>>,
}

impl<S, B> Clone for Coordinator<S, B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: RoomStore, B: EventBus> Coordinator<S, B> {
    /// Creates a coordinator and the worker that drives its drains and
    /// turn timers.
    pub fn new(
        store: S,
        bus: B,
        engines: EngineRegistry,
        config: CoordinatorConfig,
    ) -> (Self, DrainWorker<S, B>) {
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let timer = TurnTimer::new(config.timer.clone(), timer_tx);

        let coordinator = Self {
            shared: Arc::new(Shared {
                store,
                bus,
                engines,
                config,
                timer,
                wakes: wake_tx,
            }),
        };
        let worker = DrainWorker::new(coordinator.clone(), wake_rx, timer_rx);
        (coordinator, worker)
    }

    pub fn store(&self) -> &S {
        &self.shared.store
    }

    pub fn bus(&self) -> &B {
        &self.shared.bus
    }

    pub fn engines(&self) -> &EngineRegistry {
        &self.shared.engines
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.shared.config
    }

    pub fn timer_metrics(&self) -> TimerMetrics {
        self.shared.timer.metrics()
    }

    // -- Entry points -----------------------------------------------------

    /// Entry point for gameplay events coming from the transport.
    pub async fn on_user_message(
        &self,
        game: GameId,
        user: UserId,
        kind: EventKind,
        data: Value,
    ) -> Result<(), ParlorError> {
        self.submit(Envelope::from_user(kind, game, user, data)).await
    }

    /// Routes an envelope to its room's mailbox and triggers a drain.
    ///
    /// Envelopes whose room cannot be resolved are dropped (logged at
    /// `error`, or `debug` for `relogin`). A `timeout` carrying a `user` is
    /// a requeue signal: it clears the room's in-flight slot and wakes the
    /// room instead of being enqueued.
    ///
    /// # Errors
    /// Store failures while looking up or appending.
    pub async fn submit(&self, mut envelope: Envelope) -> Result<(), ParlorError> {
        if envelope.kind == EventKind::Timeout && envelope.user.is_some() {
            return self.requeue(&envelope).await;
        }

        let user_room = match self.resolve_room(&envelope).await {
            Ok(user_room) => user_room,
            Err(e) if e.is_routing() => {
                if envelope.kind == EventKind::Relogin {
                    debug!(game = %envelope.game, user = ?envelope.user, "relogin without a room");
                } else {
                    error!(
                        game = %envelope.game,
                        kind = %envelope.kind,
                        user = ?envelope.user,
                        error = %e,
                        "no room for envelope, dropped"
                    );
                }
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let game = envelope.game.clone();
        let room = user_room.room_id.clone();
        envelope.user_room = Some(user_room);
        self.enqueue(&game, &room, envelope).await
    }

    /// Appends an already-routed envelope to a room's mailbox and wakes the
    /// room.
    pub async fn enqueue(
        &self,
        game: &GameId,
        room: &RoomId,
        envelope: Envelope,
    ) -> Result<(), ParlorError> {
        let keys = MailboxKeys::new(game, room);
        self.shared.store.list_append(&keys, &envelope).await?;
        debug!(%game, room_id = %room, kind = %envelope.kind, "envelope enqueued");
        self.wake(keys);
        Ok(())
    }

    async fn requeue(&self, envelope: &Envelope) -> Result<(), ParlorError> {
        let room = envelope
            .room_id()
            .cloned()
            .ok_or_else(|| {
                ProtocolError::InvalidEnvelope("requeue signal without userRoom".into())
            })?;
        let keys = MailboxKeys::new(&envelope.game, &room);
        self.shared.store.delete_slot(&keys).await?;
        debug!(game = %envelope.game, room_id = %room, "requeue signal, slot cleared");
        self.wake(keys);
        Ok(())
    }

    /// Asks the worker to drain a mailbox.
    pub(crate) fn wake(&self, keys: MailboxKeys) {
        if self.shared.wakes.send(keys).is_err() {
            warn!("drain worker stopped, wake-up lost");
        }
    }

    async fn resolve_room(&self, envelope: &Envelope) -> Result<UserRoom, ParlorError> {
        let resolved = match envelope.kind {
            EventKind::Spectate => envelope
                .data
                .get("roomId")
                .and_then(Value::as_str)
                .map(|room| UserRoom::spectator(RoomId::new(room))),
            EventKind::Leaved | EventKind::Timeout => envelope.user_room.clone(),
            _ => match &envelope.user {
                Some(user) => self.shared.store.get_user_room(user, &envelope.game).await?,
                None => None,
            },
        };

        resolved.ok_or_else(|| ParlorError::Unrouted {
            kind: envelope.kind,
            game: envelope.game.clone(),
            user: envelope.user.clone(),
        })
    }

    // -- Drain loop -------------------------------------------------------

    /// Processes a room's envelopes one at a time until its mailbox is
    /// empty or another drainer holds it. Returns how many were processed.
    pub async fn drain(&self, keys: &MailboxKeys) -> usize {
        let mut processed = 0;
        loop {
            let envelope = match self.shared.store.list_dequeue_to_slot(keys).await {
                Ok(Dequeued::Fresh(envelope)) => envelope,
                Ok(Dequeued::InFlight(occupant)) => {
                    debug!(
                        game = %keys.game,
                        room_id = %keys.room,
                        kind = %occupant.kind,
                        "room busy, leaving it to the current drainer"
                    );
                    break;
                }
                Ok(Dequeued::Empty) => break,
                Err(e) => {
                    error!(game = %keys.game, room_id = %keys.room, error = %e, "dequeue failed");
                    self.close_room(&keys.game, &keys.room).await;
                    break;
                }
            };

            self.process(keys, &envelope).await;
            processed += 1;

            if let Err(e) = self.shared.store.delete_slot(keys).await {
                error!(game = %keys.game, room_id = %keys.room, error = %e, "acknowledge failed");
                break;
            }
            debug!(game = %keys.game, room_id = %keys.room, "envelope acknowledged");
        }
        processed
    }

    /// Handles one envelope. A failure closes the room; it never
    /// propagates.
    pub(crate) async fn process(&self, keys: &MailboxKeys, envelope: &Envelope) {
        debug!(
            game = %keys.game,
            room_id = %keys.room,
            kind = %envelope.kind,
            "processing envelope"
        );
        if let Err(e) = self.handle(&keys.room, envelope).await {
            error!(
                game = %keys.game,
                room_id = %keys.room,
                kind = %envelope.kind,
                user = ?envelope.user,
                error = %e,
                "envelope failed, closing room"
            );
            self.close_room(&keys.game, &keys.room).await;
        }
    }

    pub(crate) async fn close_room(&self, game: &GameId, room: &RoomId) {
        if let Err(e) = self.shared.bus.close_room(game, room).await {
            error!(%game, room_id = %room, error = %e, "failed to publish close_room");
        }
    }

    async fn handle(&self, room_id: &RoomId, envelope: &Envelope) -> Result<(), ParlorError> {
        let game = &envelope.game;
        let kind = envelope.kind;
        let registered = self.shared.engines.get(game)?;
        let user_room = envelope
            .user_room
            .as_ref()
            .ok_or_else(|| ProtocolError::InvalidEnvelope(format!("{kind} without userRoom")))?;

        if kind == EventKind::Spectate {
            // Extension point: spectator join notifications.
            debug!(%game, room_id = %room_id, user = ?envelope.user, "spectate");
            return Ok(());
        }

        let required = matches!(kind, EventKind::Leave | EventKind::Leaved | EventKind::Timeout)
            || user_room.is_player();
        let Some(mut room) = self.shared.store.load_room(game, room_id).await? else {
            if kind == EventKind::Timeout {
                debug!(%game, room_id = %room_id, "timeout for a closed room");
                return Ok(());
            }
            if required {
                return Err(RoomError::NotFound(game.clone(), room_id.clone()).into());
            }
            debug!(%game, room_id = %room_id, %kind, "no room for spectator event");
            return Ok(());
        };

        let effects = match kind {
            EventKind::Ready => self.on_ready(registered, &mut room, user_room, envelope)?,
            EventKind::Turn => self.on_turn(registered, &mut room, user_room, envelope).await?,
            EventKind::Event => self.on_event(registered, &mut room, user_room, envelope).await?,
            EventKind::Leave | EventKind::Leaved => {
                let user = acting_user(envelope)?;
                if user_room.is_player() {
                    self.player_leave(registered, &mut room, user)?
                } else {
                    self.spectator_leave(&mut room, user).await?
                }
            }
            EventKind::Disconnect => {
                self.on_disconnect(registered, &mut room, user_room, envelope)
                    .await?
            }
            EventKind::Relogin => self.on_relogin(&room, envelope).await?,
            EventKind::Timeout => self.on_timeout(registered, &mut room, envelope).await?,
            // Returned before loading the room.
            EventKind::Spectate => Vec::new(),
        };

        self.apply_effects(registered, &mut room, effects).await?;
        room.check_invariants()?;
        self.shared.store.save_room(&room).await?;
        debug!(%game, room_id = %room_id, %kind, state = %room.game_state, "room saved");
        Ok(())
    }

    // -- Per-kind handlers -------------------------------------------------

    fn on_ready(
        &self,
        registered: &RegisteredGame,
        room: &mut Room,
        user_room: &UserRoom,
        envelope: &Envelope,
    ) -> Result<Vec<EngineEffect>, ParlorError> {
        if !user_room.is_player() {
            return Ok(Vec::new());
        }
        let user = acting_user(envelope)?;
        if !room.is_waiting() {
            warn!(game = %room.game, room_id = %room.id, %user, "ready in a started game, ignored");
            return Ok(Vec::new());
        }
        Ok(registered
            .engine
            .on_message(EngineEvent::Ready, room, user, &envelope.data)?)
    }

    async fn on_turn(
        &self,
        registered: &RegisteredGame,
        room: &mut Room,
        user_room: &UserRoom,
        envelope: &Envelope,
    ) -> Result<Vec<EngineEffect>, ParlorError> {
        if !user_room.is_player() {
            return Ok(Vec::new());
        }
        let user = acting_user(envelope)?;
        if !room.is_playing() {
            warn!(game = %room.game, room_id = %room.id, %user, "turn in not started game");
            self.send_error(room, user, "turn in not started game").await?;
            return Ok(Vec::new());
        }
        if room.current_id.as_ref() != Some(user) {
            warn!(
                game = %room.game,
                room_id = %room.id,
                %user,
                current = ?room.current_id,
                "not your turn"
            );
            self.send_error(room, user, "not your turn").await?;
            return Ok(Vec::new());
        }

        let mut turn = envelope.data.clone();
        let stripped = strip_reserved_fields(&mut turn);
        if !stripped.is_empty() {
            warn!(
                game = %room.game,
                room_id = %room.id,
                %user,
                fields = ?stripped,
                "reserved fields in turn removed"
            );
        }
        Ok(registered.engine.on_message(EngineEvent::Turn, room, user, &turn)?)
    }

    async fn on_event(
        &self,
        registered: &RegisteredGame,
        room: &mut Room,
        user_room: &UserRoom,
        envelope: &Envelope,
    ) -> Result<Vec<EngineEffect>, ParlorError> {
        if !user_room.is_player() {
            return Ok(Vec::new());
        }
        let user = acting_user(envelope)?;
        if !room.is_playing() {
            warn!(game = %room.game, room_id = %room.id, %user, "event in not started game");
            self.send_error(room, user, "event in not started game").await?;
            return Ok(Vec::new());
        }
        if !has_event_type(&envelope.data) {
            warn!(game = %room.game, room_id = %room.id, %user, "event without type");
            self.send_error(room, user, "wrong event type").await?;
            return Ok(Vec::new());
        }
        Ok(registered
            .engine
            .on_message(EngineEvent::Event, room, user, &envelope.data)?)
    }

    fn player_leave(
        &self,
        registered: &RegisteredGame,
        room: &mut Room,
        user: &UserId,
    ) -> Result<Vec<EngineEffect>, ParlorError> {
        if !room.has_player(user) {
            debug!(
                game = %room.game,
                room_id = %room.id,
                %user,
                "leave from a non-player, ignored"
            );
            return Ok(Vec::new());
        }
        Ok(registered
            .engine
            .on_message(EngineEvent::Leave, room, user, &Value::Null)?)
    }

    async fn spectator_leave(
        &self,
        room: &mut Room,
        user: &UserId,
    ) -> Result<Vec<EngineEffect>, ParlorError> {
        if !room.leave_spectator(user) {
            debug!(game = %room.game, room_id = %room.id, %user, "spectator was not watching");
            return Ok(Vec::new());
        }
        let notification =
            self.notification("spectator_leave", json!({ "user": user, "room": room.id }));
        self.shared.bus.send_in_room(&room.game, &room.id, &notification).await?;
        self.shared.bus.leave_user_room(user, &room.id).await?;
        Ok(Vec::new())
    }

    async fn on_disconnect(
        &self,
        registered: &RegisteredGame,
        room: &mut Room,
        user_room: &UserRoom,
        envelope: &Envelope,
    ) -> Result<Vec<EngineEffect>, ParlorError> {
        let user = acting_user(envelope)?;
        if !user_room.is_player() {
            return self.spectator_leave(room, user).await;
        }
        if room.is_waiting() {
            return self.player_leave(registered, room, user);
        }
        // Mid-round the seat is kept; the turn timer handles an absent player.
        debug!(
            game = %room.game,
            room_id = %room.id,
            %user,
            state = %room.game_state,
            "player disconnected"
        );
        Ok(Vec::new())
    }

    async fn on_relogin(
        &self,
        room: &Room,
        envelope: &Envelope,
    ) -> Result<Vec<EngineEffect>, ParlorError> {
        let user = acting_user(envelope)?;
        let notification = self.notification("game_restart", room.game_data(user));
        self.shared.bus.send_to_user(&room.game, user, &notification).await?;
        Ok(Vec::new())
    }

    // -- Notifications -----------------------------------------------------

    pub(crate) fn notification(&self, kind: &str, data: Value) -> Notification {
        Notification::new(self.shared.config.notification_module.clone(), kind, data)
    }

    async fn send_error(
        &self,
        room: &Room,
        user: &UserId,
        reason: &str,
    ) -> Result<(), ParlorError> {
        let message = format!("{reason}, room: {}", room.id);
        let notification = self.notification("error", Value::String(message));
        self.shared.bus.send_to_user(&room.game, user, &notification).await?;
        Ok(())
    }
}

fn acting_user(envelope: &Envelope) -> Result<&UserId, ParlorError> {
    envelope
        .user
        .as_ref()
        .ok_or_else(|| {
            ProtocolError::InvalidEnvelope(format!("{} without user", envelope.kind)).into()
        })
}

/// Removes coordinator-owned control fields from a turn payload and
/// returns the ones that were present.
pub fn strip_reserved_fields(turn: &mut Value) -> Vec<&'static str> {
    let mut stripped = Vec::new();
    if let Value::Object(fields) = turn {
        for name in RESERVED_TURN_FIELDS {
            if fields.remove(name).is_some() {
                stripped.push(name);
            }
        }
    }
    stripped
}

fn has_event_type(event: &Value) -> bool {
    match event.get("type") {
        Some(Value::String(kind)) => !kind.is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_reserved_fields_removes_only_reserved() {
        let mut turn = json!({
            "cell": 4,
            "action": "timeout",
            "type": "move",
            "nextPlayer": "b",
            "userTurnTime": 10
        });
        let stripped = strip_reserved_fields(&mut turn);
        assert_eq!(stripped, vec!["action", "type", "nextPlayer", "userTurnTime"]);
        assert_eq!(turn, json!({ "cell": 4 }));
    }

    #[test]
    fn test_strip_reserved_fields_non_object_untouched() {
        let mut turn = json!([1, 2]);
        assert!(strip_reserved_fields(&mut turn).is_empty());
        assert_eq!(turn, json!([1, 2]));
    }

    #[test]
    fn test_has_event_type() {
        assert!(has_event_type(&json!({ "type": "draw" })));
        assert!(!has_event_type(&json!({ "type": "" })));
        assert!(!has_event_type(&json!({ "type": null })));
        assert!(!has_event_type(&json!({ "offer": true })));
        assert!(!has_event_type(&json!("draw")));
    }
}
