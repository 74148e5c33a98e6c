//! Tests for error types

use prometheus_event_loop::core::{Priority, SchedulerError};

#[test]
fn test_queue_full_error() {
    let err = SchedulerError::QueueFull(Priority::High);
    assert_eq!(format!("{}", err), "high priority queue is full");
}

#[test]
fn test_lifecycle_errors() {
    assert_eq!(SchedulerError::NotRunning.to_string(), "scheduler is not running");
    assert_eq!(SchedulerError::Stopped.to_string(), "scheduler stopped");
    assert_eq!(
        SchedulerError::NoProcessor.to_string(),
        "no event processor configured"
    );
}

#[test]
fn test_processor_error_wraps_anyhow() {
    let err: SchedulerError = anyhow::anyhow!("model unavailable").into();
    assert_eq!(err.to_string(), "event processor failed: model unavailable");

    let err = SchedulerError::processor("bad frame");
    assert!(matches!(err, SchedulerError::Processor(_)));
}

#[test]
fn test_cancellation_classification() {
    assert!(SchedulerError::Cancelled.is_cancellation());
    assert!(SchedulerError::DeadlineExceeded.is_cancellation());
    assert!(!SchedulerError::Stopped.is_cancellation());
    assert!(!SchedulerError::ProcessorPanicked("boom".into()).is_cancellation());
}

#[test]
fn test_unknown_priority_error() {
    let err = "critical".parse::<Priority>().unwrap_err();
    assert_eq!(err.to_string(), "unknown priority: critical");
}
