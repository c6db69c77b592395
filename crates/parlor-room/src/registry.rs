//! Engine registry: which engine and configuration serve which game.

use std::collections::HashMap;
use std::sync::Arc;

use parlor_protocol::GameId;

use crate::{GameConfig, GameEngine, RoomError};

/// An engine together with its game's configuration.
///
/// Cheap to clone: the engine sits behind an `Arc`.
#[derive(Clone)]
pub struct RegisteredGame {
    pub engine: Arc<dyn GameEngine>,
    pub config: GameConfig,
}

/// Maps each game id to its engine.
///
/// Built once at startup and shared read-only by every drain loop.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    games: HashMap<GameId, RegisteredGame>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the engine for `game`.
    pub fn register(
        &mut self,
        game: GameId,
        engine: impl GameEngine,
        config: GameConfig,
    ) -> &mut Self {
        tracing::info!(%game, "engine registered");
        self.games.insert(
            game,
            RegisteredGame {
                engine: Arc::new(engine),
                config,
            },
        );
        self
    }

    /// Looks up a game.
    ///
    /// # Errors
    /// Returns [`RoomError::UnknownGame`] when no engine is registered.
    pub fn get(&self, game: &GameId) -> Result<&RegisteredGame, RoomError> {
        self.games
            .get(game)
            .ok_or_else(|| RoomError::UnknownGame(game.clone()))
    }

    pub fn contains(&self, game: &GameId) -> bool {
        self.games.contains_key(game)
    }

    /// All registered game ids.
    pub fn games(&self) -> Vec<GameId> {
        self.games.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("games", &self.games.keys().collect::<Vec<_>>())
            .finish()
    }
}
