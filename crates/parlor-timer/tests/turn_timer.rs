//! Integration tests for the turn timer.
//!
//! All tests run with paused, auto-advancing time: the clock jumps straight
//! to the next timer deadline whenever the runtime is idle.

use std::time::Duration;

use parlor_timer::{TimerConfig, TimerMetrics, TurnTimer};
use tokio::sync::mpsc;
use tokio::time::Instant;

// =========================================================================
// Helpers
// =========================================================================

fn timer<T: Send + 'static>(config: TimerConfig) -> (TurnTimer<T>, mpsc::UnboundedReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TurnTimer::new(config, tx), rx)
}

fn assert_close(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual < expected + Duration::from_millis(10),
        "expected ~{expected:?}, got {actual:?}"
    );
}

// =========================================================================
// Delivery
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_schedule_delivers_after_delay() {
    let (timer, mut rx) = timer(TimerConfig::default());
    let start = Instant::now();

    let armed = timer.schedule(Duration::from_secs(5), "timeout");

    assert_eq!(armed, Duration::from_secs(5));
    assert_eq!(rx.recv().await, Some("timeout"));
    assert_close(start.elapsed(), Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_schedule_delivers_in_deadline_order() {
    let (timer, mut rx) = timer(TimerConfig::default());

    timer.schedule(Duration::from_secs(3), 3u32);
    timer.schedule(Duration::from_secs(1), 1u32);
    timer.schedule(Duration::from_secs(2), 2u32);

    let mut order = Vec::new();
    for _ in 0..3 {
        order.push(rx.recv().await.unwrap());
    }
    assert_eq!(order, vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_schedule_zero_delay_uses_minimum_plus_grace() {
    let config = TimerConfig {
        grace: Duration::from_millis(400),
        ..TimerConfig::default()
    };
    let (timer, mut rx) = timer(config);
    let start = Instant::now();

    let armed = timer.schedule(Duration::ZERO, ());

    assert_eq!(armed, Duration::from_millis(500));
    rx.recv().await.unwrap();
    assert_close(start.elapsed(), Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn test_superseded_timers_still_fire() {
    // Timers are never cancelled; the receiver decides what is stale.
    let (timer, mut rx) = timer(TimerConfig::default());
    timer.schedule(Duration::from_secs(10), ("turn", 100));
    timer.schedule(Duration::from_secs(10), ("turn", 101));

    let mut fired = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
    fired.sort();
    assert_eq!(fired, vec![("turn", 100), ("turn", 101)]);
}

// =========================================================================
// Metrics
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_metrics_count_fired_timers() {
    let (timer, mut rx) = timer(TimerConfig::default());
    timer.schedule(Duration::from_secs(1), 1u8);
    timer.schedule(Duration::from_secs(2), 2u8);
    rx.recv().await.unwrap();
    rx.recv().await.unwrap();

    assert_eq!(
        timer.metrics(),
        TimerMetrics {
            scheduled: 2,
            fired: 2,
            dropped: 0
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_metrics_count_dropped_when_receiver_closed() {
    let (timer, rx) = timer(TimerConfig::default());
    drop(rx);

    timer.schedule(Duration::from_secs(1), 1u8);
    tokio::time::sleep(Duration::from_secs(2)).await;

    let metrics = timer.metrics();
    assert_eq!(metrics.scheduled, 1);
    assert_eq!(metrics.fired, 0);
    assert_eq!(metrics.dropped, 1);
}

#[tokio::test(start_paused = true)]
async fn test_clones_share_metrics() {
    let (timer, mut rx) = timer(TimerConfig::default());
    let clone = timer.clone();
    clone.schedule(Duration::from_secs(1), 7u8);
    rx.recv().await.unwrap();
    assert_eq!(timer.metrics().fired, 1);
    assert_eq!(timer.config(), clone.config());
}
