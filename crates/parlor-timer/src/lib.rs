//! Deferred turn timers for Parlor.
//!
//! When a turn begins the coordinator asks the [`TurnTimer`] to deliver a
//! timeout envelope once the turn's duration has elapsed. Delivery is a send
//! on an mpsc channel; whoever owns the receiver feeds the item back into the
//! room's mailbox.
//!
//! # No cancellation
//!
//! A scheduled timer always fires. If the turn it was armed for already
//! ended, the receiver recognizes the item as stale (its turn start time no
//! longer matches the room's) and drops it. This keeps timers free of any
//! per-room bookkeeping and works the same across processes.
//!
//! ```ignore
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let timer = TurnTimer::new(TimerConfig::default(), tx);
//! timer.schedule(room.turn_time(default), timeout_envelope);
//! // later, in the worker:
//! while let Some(envelope) = rx.recv().await { /* enqueue it */ }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for turn timers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerConfig {
    /// Shortest delay a timer may be armed with.
    pub min_delay: Duration,
    /// Longest delay a timer may be armed with.
    pub max_delay: Duration,
    /// Extra time added to every timer, so a move sent just before the
    /// deadline still reaches the mailbox first.
    pub grace: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60 * 60),
            grace: Duration::ZERO,
        }
    }
}

impl TimerConfig {
    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`TurnTimer::new`]. Rules:
    /// - `min_delay` forced ≤ `max_delay`.
    /// - `grace` capped to `max_delay`.
    pub fn validated(mut self) -> Self {
        if self.min_delay > self.max_delay {
            warn!(
                min_ms = self.min_delay.as_millis() as u64,
                max_ms = self.max_delay.as_millis() as u64,
                "min_delay exceeds max_delay, clamping"
            );
            self.min_delay = self.max_delay;
        }
        if self.grace > self.max_delay {
            warn!(
                grace_ms = self.grace.as_millis() as u64,
                "grace exceeds max_delay, clamping"
            );
            self.grace = self.max_delay;
        }
        self
    }

    /// The delay a timer requested with `requested` is actually armed with.
    pub fn effective_delay(&self, requested: Duration) -> Duration {
        requested.clamp(self.min_delay, self.max_delay) + self.grace
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Snapshot of timer activity since the timer was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerMetrics {
    /// Timers armed.
    pub scheduled: u64,
    /// Timers that delivered their item.
    pub fired: u64,
    /// Timers whose receiver was gone when they fired.
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    scheduled: AtomicU64,
    fired: AtomicU64,
    dropped: AtomicU64,
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

/// Delivers items on a channel after a delay.
///
/// Cheap to clone; clones share the channel and the metrics.
pub struct TurnTimer<T> {
    config: TimerConfig,
    tx: mpsc::UnboundedSender<T>,
    counters: Arc<Counters>,
}

impl<T> Clone for TurnTimer<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            tx: self.tx.clone(),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<T: Send + 'static> TurnTimer<T> {
    pub fn new(config: TimerConfig, tx: mpsc::UnboundedSender<T>) -> Self {
        let config = config.validated();
        debug!(
            min_ms = config.min_delay.as_millis() as u64,
            max_ms = config.max_delay.as_millis() as u64,
            grace_ms = config.grace.as_millis() as u64,
            "turn timer created"
        );
        Self {
            config,
            tx,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Arms a timer that sends `item` after `delay` (clamped, plus grace).
    ///
    /// Must be called from within a Tokio runtime. Returns the delay the
    /// timer was actually armed with.
    pub fn schedule(&self, delay: Duration, item: T) -> Duration {
        let effective = self.config.effective_delay(delay);
        let tx = self.tx.clone();
        let counters = Arc::clone(&self.counters);
        counters.scheduled.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(async move {
            tokio::time::sleep(effective).await;
            if tx.send(item).is_ok() {
                counters.fired.fetch_add(1, Ordering::Relaxed);
                trace!(delay_ms = effective.as_millis() as u64, "turn timer fired");
            } else {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("turn timer fired after receiver closed");
            }
        });

        effective
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    /// Snapshot of current metrics.
    pub fn metrics(&self) -> TimerMetrics {
        TimerMetrics {
            scheduled: self.counters.scheduled.load(Ordering::Relaxed),
            fired: self.counters.fired.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}
