//! Priority event loop scheduler: lifecycle, submission and runtime configuration.
//!
//! A [`Scheduler`] owns three bounded queues (High, Medium, Low) and one
//! dedicated scheduling thread that drains them in strict priority order under
//! a per-frame Low budget. Results flow to result sinks through the delivery
//! subsystem, inline on the scheduling thread or through a dispatch thread.
//!
//! # Example
//!
//! ```rust,ignore
//! use prometheus_event_loop::config::SchedulerConfig;
//! use prometheus_event_loop::core::{result_channel, Event, Priority, Scheduler};
//!
//! let scheduler = Scheduler::new(SchedulerConfig::new(), Some(Arc::new(MyProcessor)))?;
//! scheduler.start()?;
//!
//! let (sink, rx) = result_channel();
//! scheduler.submit(Event::new(Priority::High, "render", frame).with_result_sink(sink))?;
//! let result = rx.recv_timeout(Duration::from_secs(1))?;
//!
//! scheduler.stop();
//! ```

mod worker;

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{DeliveryConfig, DeliveryMode, SchedulerConfig};

use super::cancel::CancelToken;
use super::delivery::Delivery;
use super::error::SchedulerError;
use super::event::{Event, EventId, Priority, Queued};
use super::frame::FrameBudget;
use super::hooks::Hooks;
use super::logger::{Logger, NoopLogger};
use super::metrics::{Counter, Metrics, MetricsSnapshot, NoopMetrics};
use super::processor::EventProcessor;
use super::queue::{PriorityQueues, QueueReceivers};

use worker::EventLoop;

/// Lifecycle state of a scheduler. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Constructed, not yet started.
    NotStarted,
    /// Scheduling thread is running.
    Running,
    /// Stopped; cannot be restarted.
    Stopped,
}

impl SchedulerState {
    const fn to_u8(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Running => 1,
            Self::Stopped => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotStarted,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Stopped => "stopped",
        })
    }
}

/// Single-worker priority event loop.
///
/// `D` is the event payload type and `R` the result type produced by the
/// [`EventProcessor`]. All methods take `&self` and may be called from any
/// thread; share the scheduler through an `Arc`.
pub struct Scheduler<D, R>
where
    D: Send + 'static,
    R: Send + 'static,
{
    config: SchedulerConfig,

    /// Producer side of the three priority queues.
    queues: PriorityQueues<D, R>,

    /// Consumer side, moved into the scheduling thread by `start`.
    receivers: Mutex<Option<QueueReceivers<D, R>>>,

    /// Absent means every event resolves to `NoProcessor`.
    processor: Option<Arc<dyn EventProcessor<D, R>>>,

    /// Delivery settings, logger and metrics; replaceable at runtime.
    hooks: Arc<Hooks>,

    /// Lifecycle state (lock-free read path for submitters).
    state: AtomicU8,

    /// Scheduling thread handle; the lock also serialises start/stop.
    worker: Mutex<Option<JoinHandle<()>>>,

    /// Dropped to broadcast the stop signal.
    stop_tx: Mutex<Option<Sender<()>>>,
    stop_rx: Receiver<()>,

    /// Sequence counter for admitted events. Wraps on overflow.
    next_id: AtomicU64,
}

impl<D, R> Scheduler<D, R>
where
    D: Send + 'static,
    R: Send + 'static,
{
    /// Create a scheduler with no-op logger and metrics.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` if the configuration is invalid.
    pub fn new(
        config: SchedulerConfig,
        processor: Option<Arc<dyn EventProcessor<D, R>>>,
    ) -> Result<Self, SchedulerError> {
        Self::with_hooks(config, processor, Arc::new(NoopLogger), Arc::new(NoopMetrics))
    }

    /// Create a scheduler with the given logger and metrics sink.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` if the configuration is invalid.
    pub fn with_hooks(
        config: SchedulerConfig,
        processor: Option<Arc<dyn EventProcessor<D, R>>>,
        logger: Arc<dyn Logger>,
        metrics: Arc<dyn Metrics>,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;

        let (queues, receivers) = PriorityQueues::new(config.queue_capacity);
        let (stop_tx, stop_rx) = bounded(0);
        let hooks = Hooks::new(config.delivery, logger, metrics);

        debug!(
            queue_capacity = config.queue_capacity,
            delivery = %config.delivery.mode,
            has_processor = processor.is_some(),
            "scheduler created"
        );

        Ok(Self {
            config,
            queues,
            receivers: Mutex::new(Some(receivers)),
            processor,
            hooks: Arc::new(hooks),
            state: AtomicU8::new(SchedulerState::NotStarted.to_u8()),
            worker: Mutex::new(None),
            stop_tx: Mutex::new(Some(stop_tx)),
            stop_rx,
            next_id: AtomicU64::new(0),
        })
    }

    /// Start the scheduling thread (and, in async delivery mode, the dispatch
    /// thread), then wait up to the readiness timeout for it to report ready.
    ///
    /// Calling `start` on a running scheduler is a no-op.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::Stopped` if the scheduler was already stopped
    /// - `SchedulerError::Runtime` if the runtime or a thread cannot be created
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut worker = self.worker.lock();
        match self.state() {
            SchedulerState::Running => return Ok(()),
            SchedulerState::Stopped => return Err(SchedulerError::Stopped),
            SchedulerState::NotStarted => {}
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SchedulerError::Runtime(format!("failed to build processor runtime: {e}")))?;

        let mut delivery = Delivery::new(
            Arc::clone(&self.hooks),
            self.stop_rx.clone(),
            self.config.callback_queue_capacity,
        );
        if self.hooks.delivery().mode == DeliveryMode::Async {
            delivery.start_dispatcher()?;
        }

        let Some(queues) = self.receivers.lock().take() else {
            return Err(SchedulerError::Stopped);
        };
        let event_loop = EventLoop {
            queues,
            stop: self.stop_rx.clone(),
            deferred: VecDeque::new(),
            budget: FrameBudget::new(&self.config.frame),
            processor: self.processor.clone(),
            runtime,
            delivery,
            hooks: Arc::clone(&self.hooks),
        };

        let (ready_tx, ready_rx) = bounded(1);
        let spawned = thread::Builder::new()
            .name("pel-scheduler".into())
            .spawn(move || event_loop.run(&ready_tx));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                // The receivers went down with the closure; this scheduler cannot run again.
                self.state
                    .store(SchedulerState::Stopped.to_u8(), Ordering::Release);
                return Err(SchedulerError::Runtime(format!(
                    "failed to spawn scheduling thread: {e}"
                )));
            }
        };
        *worker = Some(handle);
        self.state
            .store(SchedulerState::Running.to_u8(), Ordering::Release);

        let readiness = self.config.readiness_timeout();
        match ready_rx.recv_timeout(readiness) {
            Ok(()) => info!(
                queue_capacity = self.config.queue_capacity,
                delivery = %self.hooks.delivery().mode,
                "scheduler started"
            ),
            Err(RecvTimeoutError::Timeout) => self.hooks.logger().warn(&format!(
                "scheduling thread not ready after {readiness:?}; continuing"
            )),
            Err(RecvTimeoutError::Disconnected) => self
                .hooks
                .logger()
                .warn("scheduling thread exited before reporting ready"),
        }
        Ok(())
    }

    /// Stop the scheduler. Idempotent.
    ///
    /// Signals stop (waking blocked submitters and pending deliveries), closes
    /// admission, then waits up to the shutdown timeout for the scheduling
    /// thread to finish its current event and answer everything still queued
    /// with `SchedulerError::Stopped`. A thread that overruns is detached.
    pub fn stop(&self) {
        let mut worker = self.worker.lock();
        let previous = self
            .state
            .swap(SchedulerState::Stopped.to_u8(), Ordering::AcqRel);
        if SchedulerState::from_u8(previous) == SchedulerState::Stopped {
            return;
        }

        info!("stopping scheduler");
        self.stop_tx.lock().take();
        self.queues.close();

        if let Some(handle) = worker.take() {
            self.join_worker(handle);
        }
        info!("scheduler stopped");
    }

    fn join_worker(&self, handle: JoinHandle<()>) {
        let timeout = self.config.shutdown_timeout();
        let (tx, rx) = bounded(1);
        let joiner = thread::Builder::new()
            .name("pel-join".into())
            .spawn(move || {
                let _ = tx.send(handle.join().is_ok());
            });
        if let Err(e) = joiner {
            warn!(error = %e, "could not wait for scheduling thread; detaching");
            return;
        }
        match rx.recv_timeout(timeout) {
            Ok(true) => debug!("scheduling thread joined"),
            Ok(false) => warn!("scheduling thread panicked"),
            Err(_) => self.hooks.logger().warn(&format!(
                "scheduling thread did not exit within {timeout:?}; detaching"
            )),
        }
    }

    /// Submit an event without blocking.
    ///
    /// # Returns
    ///
    /// The sequence id drawn for the event. Rejected submissions also draw
    /// one, so ids of admitted events may skip values.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::NotRunning` if the scheduler is not running
    /// - `SchedulerError::QueueFull` if the event's priority queue is full
    pub fn submit(&self, event: Event<D, R>) -> Result<EventId, SchedulerError> {
        self.admit(event, |queues, queued| queues.try_push(queued))
    }

    /// Submit an event, waiting for queue space if necessary.
    ///
    /// Suspends the calling thread until space frees, `ctx` is cancelled or
    /// its deadline passes, or the scheduler stops.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::NotRunning` if the scheduler is not running
    /// - `SchedulerError::Cancelled` / `DeadlineExceeded` if `ctx` fires first
    /// - `SchedulerError::Stopped` if the scheduler stops first
    pub fn submit_blocking(&self, ctx: &CancelToken, event: Event<D, R>) -> Result<EventId, SchedulerError> {
        self.admit(event, |queues, queued| {
            queues.push_blocking(queued, ctx, &self.stop_rx)
        })
    }

    fn admit<F>(&self, event: Event<D, R>, push: F) -> Result<EventId, SchedulerError>
    where
        F: FnOnce(&PriorityQueues<D, R>, Queued<D, R>) -> Result<(), SchedulerError>,
    {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }
        let priority = event.priority();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        match push(&self.queues, Queued { id, event }) {
            Ok(()) => {
                self.hooks.metrics().increment(Counter::Submitted(priority));
                debug!(event_id = id, %priority, "event submitted");
                Ok(id)
            }
            Err(err) => {
                if let SchedulerError::QueueFull(_) = err {
                    self.hooks
                        .logger()
                        .warn(&format!("{priority} priority queue full; event rejected"));
                }
                if !matches!(err, SchedulerError::NotRunning) {
                    self.hooks.metrics().increment(Counter::Dropped(priority));
                }
                Err(err)
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the scheduler accepts submissions.
    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    /// Whether an event processor is configured.
    pub const fn has_processor(&self) -> bool {
        self.processor.is_some()
    }

    /// Events currently buffered in the queue for `priority`.
    pub fn queue_len(&self, priority: Priority) -> usize {
        self.queues.len(priority)
    }

    /// Capacity of each priority queue.
    pub const fn queue_capacity(&self) -> usize {
        self.queues.capacity()
    }

    /// Configuration the scheduler was built with.
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Current delivery settings.
    pub fn delivery(&self) -> DeliveryConfig {
        self.hooks.delivery()
    }

    /// Switch delivery mode and timeout. Takes effect for the next result.
    pub fn set_delivery(&self, mode: DeliveryMode, timeout: Duration) {
        self.hooks.set_delivery(DeliveryConfig::new(mode, timeout));
    }

    /// Replace the logger.
    pub fn set_logger(&self, logger: Arc<dyn Logger>) {
        self.hooks.set_logger(logger);
    }

    /// Replace the metrics sink.
    pub fn set_metrics(&self, metrics: Arc<dyn Metrics>) {
        self.hooks.set_metrics(metrics);
    }

    /// Snapshot of the current metrics sink.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.hooks.metrics().snapshot()
    }
}

impl<D, R> Drop for Scheduler<D, R>
where
    D: Send + 'static,
    R: Send + 'static,
{
    fn drop(&mut self) {
        // Signal stop but don't join; `stop()` is the graceful path.
        let previous = self
            .state
            .swap(SchedulerState::Stopped.to_u8(), Ordering::AcqRel);
        if SchedulerState::from_u8(previous) != SchedulerState::Stopped {
            self.stop_tx.lock().take();
            self.queues.close();
            debug!("scheduler dropped without explicit stop; worker detached");
        }
    }
}

impl<D, R> fmt::Debug for Scheduler<D, R>
where
    D: Send + 'static,
    R: Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state())
            .field("queue_capacity", &self.queues.capacity())
            .field("delivery", &self.hooks.delivery())
            .field("has_processor", &self.processor.is_some())
            .finish_non_exhaustive()
    }
}
