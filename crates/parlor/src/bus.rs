//! Outbound side of the event bus.
//!
//! The coordinator never talks to connections directly. Everything it wants
//! users to see, and every room lifecycle signal it raises, goes through an
//! [`EventBus`]. The transport (or any other subscriber) lives on the other
//! side.

use std::future::Future;

use parlor_protocol::{GameId, Notification, RoomId, UserId};
use tokio::sync::mpsc;

/// Errors returned by an [`EventBus`].
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Nobody is listening on the other side any more.
    #[error("event bus closed")]
    Closed,

    /// The bus refused the signal.
    #[error("event bus rejected {signal}: {reason}")]
    Rejected { signal: &'static str, reason: String },
}

/// Signals the coordinator publishes.
pub trait EventBus: Send + Sync + 'static {
    /// Broadcast to everyone in a room.
    fn send_in_room(
        &self,
        game: &GameId,
        room: &RoomId,
        notification: &Notification,
    ) -> impl Future<Output = Result<(), BusError>> + Send;

    /// Send to a single user.
    fn send_to_user(
        &self,
        game: &GameId,
        user: &UserId,
        notification: &Notification,
    ) -> impl Future<Output = Result<(), BusError>> + Send;

    /// The room is finished or broken; tear it down.
    fn close_room(
        &self,
        game: &GameId,
        room: &RoomId,
    ) -> impl Future<Output = Result<(), BusError>> + Send;

    /// Clear a spectator's current-room assignment.
    fn leave_user_room(
        &self,
        user: &UserId,
        room: &RoomId,
    ) -> impl Future<Output = Result<(), BusError>> + Send;

    /// A player leaves a room that has ended.
    fn user_leave_room(
        &self,
        game: &GameId,
        user: &UserId,
        room: &RoomId,
    ) -> impl Future<Output = Result<(), BusError>> + Send;
}

/// One signal published on a [`ChannelBus`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    InRoom {
        game: GameId,
        room: RoomId,
        notification: Notification,
    },
    ToUser {
        game: GameId,
        user: UserId,
        notification: Notification,
    },
    CloseRoom {
        game: GameId,
        room: RoomId,
    },
    LeaveUserRoom {
        user: UserId,
        room: RoomId,
    },
    UserLeaveRoom {
        game: GameId,
        user: UserId,
        room: RoomId,
    },
}

impl Outbound {
    /// The notification carried, if this is a send.
    pub fn notification(&self) -> Option<&Notification> {
        match self {
            Self::InRoom { notification, .. } | Self::ToUser { notification, .. } => {
                Some(notification)
            }
            _ => None,
        }
    }
}

/// An [`EventBus`] that forwards every signal to an mpsc channel.
///
/// Useful in a single process where the transport owns the receiver, and in
/// tests to observe exactly what the coordinator published.
#[derive(Debug, Clone)]
pub struct ChannelBus {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelBus {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn publish(&self, signal: Outbound) -> Result<(), BusError> {
        self.tx.send(signal).map_err(|_| BusError::Closed)
    }
}

impl EventBus for ChannelBus {
    async fn send_in_room(
        &self,
        game: &GameId,
        room: &RoomId,
        notification: &Notification,
    ) -> Result<(), BusError> {
        self.publish(Outbound::InRoom {
            game: game.clone(),
            room: room.clone(),
            notification: notification.clone(),
        })
    }

    async fn send_to_user(
        &self,
        game: &GameId,
        user: &UserId,
        notification: &Notification,
    ) -> Result<(), BusError> {
        self.publish(Outbound::ToUser {
            game: game.clone(),
            user: user.clone(),
            notification: notification.clone(),
        })
    }

    async fn close_room(&self, game: &GameId, room: &RoomId) -> Result<(), BusError> {
        self.publish(Outbound::CloseRoom {
            game: game.clone(),
            room: room.clone(),
        })
    }

    async fn leave_user_room(&self, user: &UserId, room: &RoomId) -> Result<(), BusError> {
        self.publish(Outbound::LeaveUserRoom {
            user: user.clone(),
            room: room.clone(),
        })
    }

    async fn user_leave_room(
        &self,
        game: &GameId,
        user: &UserId,
        room: &RoomId,
    ) -> Result<(), BusError> {
        self.publish(Outbound::UserLeaveRoom {
            game: game.clone(),
            user: user.clone(),
            room: room.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_channel_bus_forwards_in_order() {
        let (bus, mut rx) = ChannelBus::new();
        let game = GameId::new("g");
        let room = RoomId::new("r");
        bus.send_in_room(&game, &room, &Notification::game("ready", json!({})))
            .await
            .unwrap();
        bus.close_room(&game, &room).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().notification().unwrap().kind, "ready");
        assert_eq!(rx.recv().await.unwrap(), Outbound::CloseRoom { game, room });
    }

    #[tokio::test]
    async fn test_channel_bus_closed_receiver_is_error() {
        let (bus, rx) = ChannelBus::new();
        drop(rx);
        let result = bus.close_room(&GameId::new("g"), &RoomId::new("r")).await;
        assert!(matches!(result, Err(BusError::Closed)));
    }
}
