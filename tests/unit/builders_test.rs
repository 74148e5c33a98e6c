//! Tests for builder modules

use async_trait::async_trait;
use prometheus_event_loop::builders::SchedulerBuilder;
use prometheus_event_loop::config::SchedulerConfig;
use prometheus_event_loop::core::{
    EventMeta, EventProcessor, EventResult, InMemoryMetrics, Metrics, SchedulerError,
    SchedulerState, TracingLogger,
};
use std::sync::Arc;

struct Noop;

#[async_trait]
impl EventProcessor<(), ()> for Noop {
    async fn process(&self, _data: (), _meta: EventMeta) -> EventResult<()> {
        Ok(())
    }
}

#[test]
fn test_builder_defaults() {
    let scheduler = SchedulerBuilder::<(), ()>::new(SchedulerConfig::new())
        .build()
        .unwrap();
    assert_eq!(scheduler.state(), SchedulerState::NotStarted);
    assert!(!scheduler.has_processor());
    assert_eq!(scheduler.queue_capacity(), 256);
}

#[test]
fn test_builder_wires_capabilities() {
    let metrics = Arc::new(InMemoryMetrics::new());
    let scheduler = SchedulerBuilder::<(), ()>::new(SchedulerConfig::new().with_queue_capacity(8))
        .processor(Arc::new(Noop))
        .logger(Arc::new(TracingLogger))
        .metrics(metrics.clone())
        .build()
        .unwrap();
    assert!(scheduler.has_processor());
    assert_eq!(scheduler.config().queue_capacity, 8);
    assert_eq!(scheduler.metrics_snapshot(), metrics.snapshot());
}

#[test]
fn test_builder_rejects_invalid_config() {
    let err = SchedulerBuilder::<(), ()>::new(SchedulerConfig::new().with_queue_capacity(0))
        .build()
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidConfig(_)));
}
