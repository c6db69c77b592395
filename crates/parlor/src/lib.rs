//! # Parlor
//!
//! Room event coordinator for turn-based multiplayer game backends.
//!
//! Every event that can change a room (a player's move, a ready flag, a
//! disconnect, a fired turn timer) is appended to that room's durable
//! mailbox and applied one at a time, in arrival order, even when several
//! coordinator processes share the same store. Game rules live in a
//! [`GameEngine`](parlor_room::GameEngine) per game type; the coordinator
//! validates, routes, times, and persists around it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parlor::prelude::*;
//!
//! struct Rotation;
//! impl GameEngine for Rotation {}
//!
//! # async fn run() -> Result<(), ParlorError> {
//! parlor::telemetry::init();
//! let (bus, _outbound) = ChannelBus::new();
//! let (coordinator, _worker) = CoordinatorBuilder::new()
//!     .game(GameId::new("rotation"), Rotation, GameConfig::default())
//!     .build(MemoryStore::new(), bus)
//!     .await?;
//!
//! coordinator
//!     .on_user_message(
//!         GameId::new("rotation"),
//!         UserId::new("alice"),
//!         EventKind::Ready,
//!         serde_json::Value::Bool(true),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![allow(async_fn_in_trait)]

mod bus;
mod config;
mod coordinator;
mod error;
mod reconcile;
mod round;
mod server;
mod signals;
pub mod telemetry;
mod timeout;
mod worker;

pub use bus::{BusError, ChannelBus, EventBus, Outbound};
pub use config::{CoordinatorConfig, ReconcilePolicy};
pub use coordinator::{Coordinator, RESERVED_TURN_FIELDS, strip_reserved_fields};
pub use error::ParlorError;
pub use server::CoordinatorBuilder;
pub use signals::SystemSignal;
pub use timeout::TimeoutPayload;
pub use worker::DrainWorker;

/// Convenience re-exports for common usage.
///
/// ```rust
/// use parlor::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        BusError, ChannelBus, Coordinator, CoordinatorBuilder, CoordinatorConfig, DrainWorker,
        EventBus, Outbound, ParlorError, ReconcilePolicy, SystemSignal,
    };
    pub use parlor_protocol::{Envelope, EventKind, GameId, Notification, RoomId, UserId, UserRoom};
    pub use parlor_room::{EngineEffect, EngineError, GameConfig, GameEngine, GameState, Room};
    pub use parlor_store::{MemoryStore, RoomStore};
    pub use parlor_timer::TimerConfig;
}
