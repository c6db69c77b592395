//! `CoordinatorBuilder`: registers games, then builds and starts a
//! coordinator.
//!
//! This is the entry point for running Parlor. It ties together all the
//! layers: engines → store → bus → timer → drain worker.

use parlor_protocol::GameId;
use parlor_room::{EngineRegistry, GameConfig, GameEngine};
use parlor_store::RoomStore;
use parlor_timer::TimerConfig;
use tokio::task::JoinHandle;

use crate::{Coordinator, CoordinatorConfig, EventBus, ParlorError, ReconcilePolicy};

/// Builder for configuring and starting a coordinator.
///
/// # Example
///
/// ```rust,ignore
/// use parlor::prelude::*;
///
/// let (coordinator, worker) = CoordinatorBuilder::new()
///     .game(GameId::new("chess"), Chess, GameConfig::default())
///     .reconcile_policy(ReconcilePolicy::Replay)
///     .build(store, bus)
///     .await?;
/// ```
pub struct CoordinatorBuilder {
    engines: EngineRegistry,
    config: CoordinatorConfig,
}

impl CoordinatorBuilder {
    /// Creates a new builder with default settings and no games.
    pub fn new() -> Self {
        Self {
            engines: EngineRegistry::new(),
            config: CoordinatorConfig::default(),
        }
    }

    /// Registers the engine for one game type.
    pub fn game(mut self, game: GameId, engine: impl GameEngine, config: GameConfig) -> Self {
        self.engines.register(game, engine, config);
        self
    }

    /// Replaces the whole coordinator configuration.
    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn reconcile_policy(mut self, policy: ReconcilePolicy) -> Self {
        self.config.reconcile_policy = policy;
        self
    }

    /// Sets the `module` field of outgoing notifications.
    ///
    /// Covers the notifications the coordinator builds itself. Notifications
    /// an engine builds with `Notification::game` keep the `game_manager`
    /// module.
    pub fn notification_module(mut self, module: impl Into<String>) -> Self {
        self.config.notification_module = module.into();
        self
    }

    pub fn timer(mut self, timer: TimerConfig) -> Self {
        self.config.timer = timer;
        self
    }

    /// Builds the coordinator, reconciles in-flight slots (unless disabled),
    /// and spawns its drain worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn build<S: RoomStore, B: EventBus>(
        self,
        store: S,
        bus: B,
    ) -> Result<(Coordinator<S, B>, JoinHandle<()>), ParlorError> {
        let reconcile_on_start = self.config.reconcile_on_start;
        let (coordinator, worker) = Coordinator::new(store, bus, self.engines, self.config);

        if reconcile_on_start {
            coordinator.reconcile_all().await?;
        }

        tracing::info!(games = coordinator.engines().len(), "coordinator running");
        Ok((coordinator, worker.spawn()))
    }
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
