//! Metrics capability: counters, per-priority durations and snapshots.
//!
//! The scheduler only calls into [`Metrics`]; [`NoopMetrics`] is the default
//! and [`InMemoryMetrics`] keeps lock-free counters for tests and dashboards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use super::event::Priority;

/// Counters the scheduler increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    /// An event was admitted to its queue.
    Submitted(Priority),
    /// An event was rejected at submission or discarded without processing.
    Dropped(Priority),
    /// An event went through the processor (or its no-processor fallback).
    Processed(Priority),
    /// A result could not be handed to its sink and was discarded.
    CallbackDiscarded,
    /// An inline delivery gave up after the delivery timeout.
    InlineTimeout,
}

/// Sink for scheduler metrics.
pub trait Metrics: Send + Sync {
    /// Increment a counter by one.
    fn increment(&self, counter: Counter);
    /// Record how long processing one event of `priority` took.
    fn observe_duration(&self, priority: Priority, elapsed: Duration);
    /// Point-in-time view of everything recorded so far.
    fn snapshot(&self) -> MetricsSnapshot;
}

/// Per-priority figures in a [`MetricsSnapshot`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PriorityStats {
    /// Events admitted.
    pub submitted: u64,
    /// Events rejected or discarded unprocessed.
    pub dropped: u64,
    /// Events processed.
    pub processed: u64,
    /// Number of duration observations.
    pub observations: u64,
    /// Sum of observed processing time.
    pub total_processing: Duration,
    /// Longest observed processing time.
    pub max_processing: Duration,
}

impl PriorityStats {
    /// Mean processing time, if anything was observed.
    #[must_use]
    pub fn mean_processing(&self) -> Option<Duration> {
        let count = u32::try_from(self.observations).ok().filter(|c| *c > 0)?;
        Some(self.total_processing / count)
    }
}

/// Snapshot of scheduler metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// High priority figures.
    pub high: PriorityStats,
    /// Medium priority figures.
    pub medium: PriorityStats,
    /// Low priority figures.
    pub low: PriorityStats,
    /// Results discarded by the delivery subsystem.
    pub callbacks_discarded: u64,
    /// Inline deliveries abandoned on timeout.
    pub inline_timeouts: u64,
}

impl MetricsSnapshot {
    /// Figures for one priority class.
    #[must_use]
    pub const fn priority(&self, priority: Priority) -> &PriorityStats {
        match priority {
            Priority::High => &self.high,
            Priority::Medium => &self.medium,
            Priority::Low => &self.low,
        }
    }

    /// Total processed across all priorities.
    #[must_use]
    pub const fn total_processed(&self) -> u64 {
        self.high.processed + self.medium.processed + self.low.processed
    }
}

/// Metrics sink that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn increment(&self, _counter: Counter) {}

    fn observe_duration(&self, _priority: Priority, _elapsed: Duration) {}

    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot::default()
    }
}

#[derive(Debug, Default)]
struct PriorityCounters {
    submitted: AtomicU64,
    dropped: AtomicU64,
    processed: AtomicU64,
    observations: AtomicU64,
    total_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

impl PriorityCounters {
    fn snapshot(&self) -> PriorityStats {
        PriorityStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            observations: self.observations.load(Ordering::Relaxed),
            total_processing: Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed)),
            max_processing: Duration::from_nanos(self.max_nanos.load(Ordering::Relaxed)),
        }
    }
}

/// Lock-free in-process metrics.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    lanes: [PriorityCounters; 3],
    callbacks_discarded: AtomicU64,
    inline_timeouts: AtomicU64,
}

impl InMemoryMetrics {
    /// Create an empty metrics store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    const fn lane(&self, priority: Priority) -> &PriorityCounters {
        &self.lanes[priority.index()]
    }
}

impl Metrics for InMemoryMetrics {
    fn increment(&self, counter: Counter) {
        let cell = match counter {
            Counter::Submitted(p) => &self.lane(p).submitted,
            Counter::Dropped(p) => &self.lane(p).dropped,
            Counter::Processed(p) => &self.lane(p).processed,
            Counter::CallbackDiscarded => &self.callbacks_discarded,
            Counter::InlineTimeout => &self.inline_timeouts,
        };
        cell.fetch_add(1, Ordering::Relaxed);
    }

    fn observe_duration(&self, priority: Priority, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        let lane = self.lane(priority);
        lane.observations.fetch_add(1, Ordering::Relaxed);
        lane.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        lane.max_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            high: self.lane(Priority::High).snapshot(),
            medium: self.lane(Priority::Medium).snapshot(),
            low: self.lane(Priority::Low).snapshot(),
            callbacks_discarded: self.callbacks_discarded.load(Ordering::Relaxed),
            inline_timeouts: self.inline_timeouts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_snapshot_is_empty() {
        let metrics = NoopMetrics;
        metrics.increment(Counter::Submitted(Priority::High));
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_in_memory_counters() {
        let metrics = InMemoryMetrics::new();
        metrics.increment(Counter::Submitted(Priority::High));
        metrics.increment(Counter::Submitted(Priority::High));
        metrics.increment(Counter::Dropped(Priority::Low));
        metrics.increment(Counter::Processed(Priority::Medium));
        metrics.increment(Counter::CallbackDiscarded);
        metrics.increment(Counter::InlineTimeout);

        let snap = metrics.snapshot();
        assert_eq!(snap.high.submitted, 2);
        assert_eq!(snap.low.dropped, 1);
        assert_eq!(snap.priority(Priority::Medium).processed, 1);
        assert_eq!(snap.total_processed(), 1);
        assert_eq!(snap.callbacks_discarded, 1);
        assert_eq!(snap.inline_timeouts, 1);
    }

    #[test]
    fn test_duration_observations() {
        let metrics = InMemoryMetrics::new();
        metrics.observe_duration(Priority::Low, Duration::from_millis(10));
        metrics.observe_duration(Priority::Low, Duration::from_millis(30));

        let low = metrics.snapshot().low;
        assert_eq!(low.observations, 2);
        assert_eq!(low.total_processing, Duration::from_millis(40));
        assert_eq!(low.max_processing, Duration::from_millis(30));
        assert_eq!(low.mean_processing(), Some(Duration::from_millis(20)));
        assert_eq!(PriorityStats::default().mean_processing(), None);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = InMemoryMetrics::new();
        metrics.increment(Counter::Processed(Priority::High));
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["high"]["processed"], 1);
        assert_eq!(json["callbacks_discarded"], 0);
    }
}
