//! Room state and game engines for Parlor.
//!
//! A room is one game session. Its state is a plain serializable value
//! ([`Room`]) that the coordinator loads from the store, hands to the game's
//! engine, and saves back. Engines never talk to the store or the bus
//! directly: they mutate the room in place and return a list of
//! [`EngineEffect`]s for the coordinator to carry out.
//!
//! # Key types
//!
//! - [`Room`]: the persisted snapshot of one game session
//! - [`GameState`]: lifecycle state machine (Waiting → Playing → Closing)
//! - [`GameEngine`]: the trait each game type implements
//! - [`EngineRegistry`]: engines and their [`GameConfig`], keyed by game id

mod config;
mod engine;
mod error;
mod registry;
mod room;

pub use config::{GameConfig, GameState};
pub use engine::{EngineEffect, EngineEvent, GameEngine};
pub use error::{EngineError, RoomError};
pub use registry::{EngineRegistry, RegisteredGame};
pub use room::{Room, UserData};
