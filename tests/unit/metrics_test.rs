//! Tests for the metrics capability

use prometheus_event_loop::core::{Counter, InMemoryMetrics, Metrics, Priority};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_counters_are_per_priority() {
    let metrics = InMemoryMetrics::new();
    metrics.increment(Counter::Submitted(Priority::Low));
    metrics.increment(Counter::Dropped(Priority::Medium));
    metrics.increment(Counter::Processed(Priority::High));
    metrics.increment(Counter::CallbackDiscarded);

    let snap = metrics.snapshot();
    assert_eq!(snap.priority(Priority::Low).submitted, 1);
    assert_eq!(snap.priority(Priority::Medium).dropped, 1);
    assert_eq!(snap.priority(Priority::High).processed, 1);
    assert_eq!(snap.callbacks_discarded, 1);
    assert_eq!(snap.inline_timeouts, 0);
}

#[test]
fn test_duration_observations() {
    let metrics = InMemoryMetrics::new();
    metrics.observe_duration(Priority::High, Duration::from_millis(2));
    metrics.observe_duration(Priority::High, Duration::from_millis(6));

    let stats = metrics.snapshot().high;
    assert_eq!(stats.observations, 2);
    assert_eq!(stats.max_processing, Duration::from_millis(6));
    assert_eq!(stats.mean_processing(), Some(Duration::from_millis(4)));
    assert_eq!(metrics.snapshot().low.mean_processing(), None);
}

#[test]
fn test_concurrent_increments() {
    let metrics = Arc::new(InMemoryMetrics::new());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let metrics = Arc::clone(&metrics);
            thread::spawn(move || {
                for _ in 0..1_000 {
                    metrics.increment(Counter::Processed(Priority::Medium));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(metrics.snapshot().total_processed(), 4_000);
}

#[test]
fn test_snapshot_serializes() {
    let metrics = InMemoryMetrics::new();
    metrics.increment(Counter::InlineTimeout);
    let json = serde_json::to_value(metrics.snapshot()).unwrap();
    assert_eq!(json["inline_timeouts"], 1);
    assert_eq!(json["high"]["submitted"], 0);
}
