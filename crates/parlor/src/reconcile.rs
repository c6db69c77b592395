//! Start-up recovery of envelopes left in flight by a crashed drainer.
//!
//! An occupied slot blocks its room forever: every drain backs off from it.
//! Reconciliation resolves each such slot according to the configured
//! [`ReconcilePolicy`] and wakes the room so its backlog is drained.

use parlor_protocol::GameId;
use parlor_store::{MailboxKeys, RoomStore};
use tracing::{error, info, warn};

use crate::{Coordinator, EventBus, ParlorError, ReconcilePolicy};

impl<S: RoomStore, B: EventBus> Coordinator<S, B> {
    /// Resolves every occupied slot of `game`. Returns how many rooms were
    /// reconciled.
    ///
    /// A slot that cannot be read or cleared only affects its own room: the
    /// room is closed and the pass moves on. Only listing the rooms can fail
    /// the whole pass.
    ///
    /// Only safe while no other coordinator is draining `game`.
    pub async fn reconcile(&self, game: &GameId) -> Result<usize, ParlorError> {
        let rooms = self.shared.store.in_flight_rooms(game).await?;
        let policy = self.shared.config.reconcile_policy;

        let mut reconciled = 0;
        for room in &rooms {
            let keys = MailboxKeys::new(game, room);
            match self.reconcile_room(&keys, policy).await {
                Ok(()) => {
                    reconciled += 1;
                    self.wake(keys);
                }
                Err(e) => {
                    error!(
                        %game,
                        room_id = %room,
                        error = %e,
                        "in-flight slot unreadable, closing room"
                    );
                    if let Err(e) = self.shared.store.delete_slot(&keys).await {
                        error!(
                            %game,
                            room_id = %room,
                            error = %e,
                            "failed to clear in-flight slot"
                        );
                    }
                    self.close_room(game, room).await;
                }
            }
        }

        if !rooms.is_empty() {
            info!(
                %game,
                rooms = rooms.len(),
                reconciled,
                ?policy,
                "in-flight slots reconciled"
            );
        }
        Ok(reconciled)
    }

    async fn reconcile_room(
        &self,
        keys: &MailboxKeys,
        policy: ReconcilePolicy,
    ) -> Result<(), ParlorError> {
        if let Some(envelope) = self.shared.store.peek_slot(keys).await? {
            match policy {
                ReconcilePolicy::Discard => {
                    warn!(
                        game = %keys.game,
                        room_id = %keys.room,
                        kind = %envelope.kind,
                        user = ?envelope.user,
                        "discarding unacknowledged envelope"
                    );
                }
                ReconcilePolicy::Replay => {
                    info!(
                        game = %keys.game,
                        room_id = %keys.room,
                        kind = %envelope.kind,
                        "replaying unacknowledged envelope"
                    );
                    self.process(keys, &envelope).await;
                }
            }
        }
        self.shared.store.delete_slot(keys).await?;
        Ok(())
    }

    /// Runs [`reconcile`](Self::reconcile) for every registered game.
    pub async fn reconcile_all(&self) -> Result<usize, ParlorError> {
        let mut total = 0;
        for game in self.shared.engines.games() {
            total += self.reconcile(&game).await?;
        }
        Ok(total)
    }
}
