//! Tests for utility functions

use std::time::Duration;

use kube_queue::util::{init_tracing, now_ms, Clock, ManualClock, RealClock};

#[test]
fn test_manual_clock_only_moves_when_advanced() {
    let clock = ManualClock::new();
    let start = clock.now();
    assert_eq!(clock.now(), start);
    clock.advance(Duration::from_millis(1500));
    assert_eq!(clock.now() - start, Duration::from_millis(1500));
}

#[test]
fn test_real_clock_is_monotonic() {
    let a = RealClock.now();
    let b = RealClock.now();
    assert!(b >= a);
}

#[test]
fn test_now_ms_is_after_epoch() {
    assert!(now_ms() > 1_600_000_000_000);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    tracing::info!("telemetry initialised");
}
