//! System signals from the rest of the backend.
//!
//! Room membership and connections are owned elsewhere. When they change,
//! the owner tells the coordinator with a [`SystemSignal`], which becomes a
//! server-originated envelope on the affected room's mailbox.

use parlor_protocol::{Envelope, EventKind, GameId, UserId, UserRoom};
use parlor_store::RoomStore;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::{Coordinator, EventBus, ParlorError};

#[derive(Debug, Clone, PartialEq)]
pub enum SystemSignal {
    /// The user was already removed from `user_room`.
    UserLeaved {
        game: GameId,
        user: UserId,
        user_room: UserRoom,
    },
    /// The user logged in again.
    UserRelogin { game: GameId, user: UserId },
    /// The user's connection dropped. `user_room` is informational; the
    /// room is looked up from the user's assignment.
    UserDisconnect {
        game: GameId,
        user: UserId,
        user_room: Option<UserRoom>,
    },
}

impl SystemSignal {
    pub fn into_envelope(self) -> Envelope {
        match self {
            Self::UserLeaved { game, user, user_room } => Envelope::from_server(
                EventKind::Leaved,
                game,
                Some(user),
                Some(user_room),
                Value::Null,
            ),
            Self::UserRelogin { game, user } => {
                Envelope::from_server(EventKind::Relogin, game, Some(user), None, Value::Null)
            }
            Self::UserDisconnect { game, user, .. } => {
                Envelope::from_server(EventKind::Disconnect, game, Some(user), None, Value::Null)
            }
        }
    }
}

impl<S: RoomStore, B: EventBus> Coordinator<S, B> {
    /// Routes a system signal like any other envelope.
    pub async fn on_signal(&self, signal: SystemSignal) -> Result<(), ParlorError> {
        debug!(?signal, "system signal");
        self.submit(signal.into_envelope()).await
    }

    /// Feeds every signal received on `signals` into the coordinator until
    /// the sending side closes.
    pub fn spawn_signal_pump(
        &self,
        mut signals: mpsc::UnboundedReceiver<SystemSignal>,
    ) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            while let Some(signal) = signals.recv().await {
                if let Err(e) = coordinator.on_signal(signal).await {
                    error!(error = %e, "failed to route system signal");
                }
            }
            debug!("signal pump stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use parlor_protocol::RoomId;

    use super::*;

    #[test]
    fn test_into_envelope_leaved_keeps_user_room() {
        let user_room = UserRoom::player(RoomId::new("r1"));
        let envelope = SystemSignal::UserLeaved {
            game: GameId::new("chess"),
            user: UserId::new("alice"),
            user_room: user_room.clone(),
        }
        .into_envelope();
        assert_eq!(envelope.kind, EventKind::Leaved);
        assert!(envelope.is_from_server());
        assert_eq!(envelope.user_room, Some(user_room));
    }

    #[test]
    fn test_into_envelope_disconnect_drops_user_room() {
        let envelope = SystemSignal::UserDisconnect {
            game: GameId::new("chess"),
            user: UserId::new("alice"),
            user_room: Some(UserRoom::spectator(RoomId::new("r1"))),
        }
        .into_envelope();
        assert_eq!(envelope.kind, EventKind::Disconnect);
        assert_eq!(envelope.user, Some(UserId::new("alice")));
        assert!(envelope.user_room.is_none());
    }
}
