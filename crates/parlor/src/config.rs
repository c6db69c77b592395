//! Coordinator configuration.

use parlor_protocol::GAME_MANAGER_MODULE;
use parlor_timer::TimerConfig;

/// What to do with an envelope found in a room's in-flight slot when the
/// coordinator starts (the previous attempt never acknowledged it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcilePolicy {
    /// Log it and clear the slot. The envelope's effects may be lost, but it
    /// is never applied twice.
    #[default]
    Discard,
    /// Process it again, then clear the slot. Its effects are applied at
    /// least once, possibly twice.
    Replay,
}

/// Configuration for a [`Coordinator`](crate::Coordinator).
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// `module` field of every notification the coordinator sends.
    pub notification_module: String,
    pub reconcile_policy: ReconcilePolicy,
    /// Reconcile every registered game when the coordinator is built.
    pub reconcile_on_start: bool,
    pub timer: TimerConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            notification_module: GAME_MANAGER_MODULE.to_string(),
            reconcile_policy: ReconcilePolicy::default(),
            reconcile_on_start: true,
            timer: TimerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.notification_module, "game_manager");
        assert_eq!(config.reconcile_policy, ReconcilePolicy::Discard);
        assert!(config.reconcile_on_start);
    }
}
