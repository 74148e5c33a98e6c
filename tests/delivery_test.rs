//! Integration tests for result delivery
//!
//! Covers the asynchronous dispatch path under slow consumers, the
//! logger/metrics capabilities, and processors that await on the runtime.

use async_trait::async_trait;
use parking_lot::Mutex;
use prometheus_event_loop::builders::SchedulerBuilder;
use prometheus_event_loop::config::{DeliveryMode, SchedulerConfig};
use prometheus_event_loop::core::{
    result_channel, Event, EventMeta, EventProcessor, EventResult, InMemoryMetrics, Logger,
    Metrics, Priority, SchedulerError,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Squares its input after an async delay.
struct Square {
    delay: Duration,
}

#[async_trait]
impl EventProcessor<u64, u64> for Square {
    async fn process(&self, data: u64, _meta: EventMeta) -> EventResult<u64> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(data * data)
    }
}

#[derive(Default)]
struct CapturingLogger {
    warnings: Mutex<Vec<String>>,
}

impl Logger for CapturingLogger {
    fn debug(&self, _msg: &str) {}
    fn info(&self, _msg: &str) {}
    fn warn(&self, msg: &str) {
        self.warnings.lock().push(msg.to_string());
    }
    fn error(&self, msg: &str) {
        self.warnings.lock().push(msg.to_string());
    }
}

fn async_config(timeout: Duration) -> SchedulerConfig {
    SchedulerConfig::new()
        .with_queue_capacity(64)
        .with_callback_queue_capacity(4)
        .with_delivery(DeliveryMode::Async, timeout)
}

#[test]
fn test_processor_can_await_runtime_timers() {
    let scheduler = SchedulerBuilder::<u64, u64>::new(SchedulerConfig::new())
        .processor(Arc::new(Square {
            delay: Duration::from_millis(20),
        }))
        .build()
        .unwrap();
    scheduler.start().unwrap();

    let (sink, rx) = result_channel();
    let started = Instant::now();
    scheduler
        .submit(Event::new(Priority::High, "square", 7).with_result_sink(sink))
        .unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap(), 49);
    assert!(started.elapsed() >= Duration::from_millis(20));
    scheduler.stop();
}

#[test]
fn test_slow_consumer_does_not_block_others() {
    let scheduler = SchedulerBuilder::<u64, u64>::new(async_config(Duration::from_secs(2)))
        .processor(Arc::new(Square {
            delay: Duration::ZERO,
        }))
        .build()
        .unwrap();
    scheduler.start().unwrap();

    // Nobody reads this sink until the end.
    let (slow_sink, slow_rx) = result_channel();
    slow_sink.send(Ok(0)).unwrap();
    scheduler
        .submit(Event::new(Priority::High, "slow", 3).with_result_sink(slow_sink))
        .unwrap();

    let receivers: Vec<_> = (1..=20u64)
        .map(|i| {
            let (sink, rx) = result_channel();
            scheduler
                .submit(Event::new(Priority::Medium, "fast", i).with_result_sink(sink))
                .unwrap();
            (i, rx)
        })
        .collect();
    for (i, rx) in receivers {
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap().unwrap(), i * i);
    }

    assert_eq!(slow_rx.recv().unwrap().unwrap(), 0);
    assert_eq!(slow_rx.recv_timeout(Duration::from_secs(1)).unwrap().unwrap(), 9);
    scheduler.stop();
}

#[test]
fn test_async_timeout_is_logged_and_counted() {
    let logger = Arc::new(CapturingLogger::default());
    let metrics = Arc::new(InMemoryMetrics::new());
    let scheduler = SchedulerBuilder::<u64, u64>::new(async_config(Duration::from_millis(30)))
        .processor(Arc::new(Square {
            delay: Duration::ZERO,
        }))
        .logger(logger.clone())
        .metrics(metrics.clone())
        .build()
        .unwrap();
    scheduler.start().unwrap();

    let (sink, rx) = result_channel();
    sink.send(Ok(1)).unwrap();
    scheduler
        .submit(Event::new(Priority::Low, "unread", 5).with_result_sink(sink))
        .unwrap();
    thread::sleep(Duration::from_millis(200));

    let snap = metrics.snapshot();
    assert_eq!(snap.callbacks_discarded, 1);
    assert_eq!(snap.low.processed, 1);
    assert!(logger.warnings.lock().iter().any(|w| w.contains("discarded")));
    assert_eq!(rx.try_recv().unwrap().unwrap(), 1);
    scheduler.stop();
}

#[test]
fn test_dropped_receiver_is_discarded_quietly() {
    let metrics = Arc::new(InMemoryMetrics::new());
    let scheduler = SchedulerBuilder::<u64, u64>::new(SchedulerConfig::new())
        .processor(Arc::new(Square {
            delay: Duration::ZERO,
        }))
        .metrics(metrics.clone())
        .build()
        .unwrap();
    scheduler.start().unwrap();

    let (sink, rx) = result_channel();
    drop(rx);
    scheduler
        .submit(Event::new(Priority::Medium, "gone", 2).with_result_sink(sink))
        .unwrap();

    let (sink, rx) = result_channel();
    scheduler
        .submit(Event::new(Priority::Medium, "kept", 4).with_result_sink(sink))
        .unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap(), 16);
    assert_eq!(metrics.snapshot().callbacks_discarded, 1);
    scheduler.stop();
}

#[test]
fn test_stop_releases_pending_async_delivery() {
    let scheduler = SchedulerBuilder::<u64, u64>::new(async_config(Duration::ZERO))
        .processor(Arc::new(Square {
            delay: Duration::ZERO,
        }))
        .build()
        .unwrap();
    scheduler.start().unwrap();

    // A zero timeout waits until stop for a full sink.
    let (sink, rx) = result_channel();
    sink.send(Ok(1)).unwrap();
    scheduler
        .submit(Event::new(Priority::High, "blocked", 6).with_result_sink(sink))
        .unwrap();
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    scheduler.stop();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(rx.try_recv().unwrap().unwrap(), 1);
}

#[test]
fn test_fire_and_forget_events_still_run() {
    let metrics = Arc::new(InMemoryMetrics::new());
    let scheduler = SchedulerBuilder::<u64, u64>::new(async_config(Duration::from_millis(100)))
        .processor(Arc::new(Square {
            delay: Duration::ZERO,
        }))
        .metrics(metrics.clone())
        .build()
        .unwrap();
    scheduler.start().unwrap();

    for i in 0..10 {
        scheduler.submit(Event::new(Priority::Low, "tick", i)).unwrap();
    }
    let deadline = Instant::now() + Duration::from_secs(2);
    while metrics.snapshot().low.processed < 10 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    let snap = metrics.snapshot();
    assert_eq!(snap.low.processed, 10);
    assert_eq!(snap.low.submitted, 10);
    assert_eq!(snap.callbacks_discarded, 0);
    assert!(snap.low.mean_processing().is_some());
    scheduler.stop();
}

#[test]
fn test_submit_on_unstarted_scheduler() {
    let scheduler = SchedulerBuilder::<u64, u64>::new(SchedulerConfig::new())
        .build()
        .unwrap();
    let err = scheduler
        .submit(Event::new(Priority::High, "early", 1))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::NotRunning));
}
