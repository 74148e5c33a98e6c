//! The scheduling worker: one OS thread draining the queues in priority order.
//!
//! Each iteration:
//!
//! 1. exit if the stop signal fired;
//! 2. drain every High event buffered at that moment;
//! 3. drain every Medium event buffered at that moment, restarting from step 1
//!    (skipping step 4) if High work arrives;
//! 4. if a deferred Low event exists and the frame's Low slice is not spent,
//!    process exactly one and restart;
//! 5. if steps 2-4 found nothing, block until any queue yields, the stop
//!    signal fires, or (with the Low slice spent) the frame ends. A Low
//!    arrival is parked in the deferred buffer instead of being processed, so
//!    High and Medium are always re-checked first.
//!
//! On exit every event still queued or deferred receives a `Stopped` result.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{at, never, select, Receiver, Sender};
use tokio::runtime::Runtime;
use tracing::{debug, error};

use crate::core::cancel::{signalled, CancelToken};
use crate::core::delivery::Delivery;
use crate::core::error::SchedulerError;
use crate::core::event::{Priority, Queued};
use crate::core::frame::FrameBudget;
use crate::core::hooks::Hooks;
use crate::core::metrics::Counter;
use crate::core::processor::{self, EventProcessor};
use crate::core::queue::QueueReceivers;

/// How a drain pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drain {
    Empty,
    Worked,
    /// Stopped early because High work is waiting.
    Yielded,
}

/// Why the worker woke from its idle wait.
enum Wake<D, R> {
    Arrived(Queued<D, R>),
    FrameBoundary,
    Stop,
}

/// State owned by the scheduling thread.
pub(crate) struct EventLoop<D, R>
where
    D: Send + 'static,
    R: Send + 'static,
{
    pub(crate) queues: QueueReceivers<D, R>,
    pub(crate) stop: Receiver<()>,
    pub(crate) deferred: VecDeque<Queued<D, R>>,
    pub(crate) budget: FrameBudget,
    pub(crate) processor: Option<Arc<dyn EventProcessor<D, R>>>,
    pub(crate) runtime: Runtime,
    pub(crate) delivery: Delivery<R>,
    pub(crate) hooks: Arc<Hooks>,
}

impl<D, R> EventLoop<D, R>
where
    D: Send + 'static,
    R: Send + 'static,
{
    /// Run until stopped, then flush and shut delivery down.
    pub(crate) fn run(mut self, ready: &Sender<()>) {
        let _ = ready.try_send(());
        debug!("scheduler worker started");

        loop {
            if signalled(&self.stop) {
                break;
            }

            let high = self.drain(Priority::High);
            let medium = self.drain(Priority::Medium);
            if medium == Drain::Yielded {
                continue;
            }

            if !self.deferred.is_empty() && self.budget.low_allowed(Instant::now()) {
                self.run_deferred_low();
                continue;
            }
            if high != Drain::Empty || medium != Drain::Empty {
                continue;
            }

            match self.wait() {
                Wake::Arrived(queued) if queued.event.priority() == Priority::Low => {
                    self.deferred.push_back(queued);
                }
                Wake::Arrived(queued) => {
                    self.handle(queued);
                }
                Wake::FrameBoundary => {}
                Wake::Stop => break,
            }
        }

        self.flush();
        self.delivery.shutdown();
        debug!("scheduler worker exiting");
    }

    /// Process every event of `priority` buffered right now. A Medium drain
    /// yields as soon as High work shows up, before any Low work may run.
    fn drain(&mut self, priority: Priority) -> Drain {
        let pending = self.queues.lane(priority).len();
        let mut outcome = Drain::Empty;
        for _ in 0..pending {
            if priority != Priority::High && !self.queues.lane(Priority::High).is_empty() {
                return Drain::Yielded;
            }
            let next = self.queues.lane(priority).try_recv();
            match next {
                Ok(queued) => {
                    outcome = Drain::Worked;
                    self.handle(queued);
                }
                Err(_) => break,
            }
        }
        outcome
    }

    fn run_deferred_low(&mut self) {
        if let Some(queued) = self.deferred.pop_front() {
            let elapsed = self.handle(queued);
            self.budget.charge_low(elapsed);
        }
    }

    fn wait(&self) -> Wake<D, R> {
        // Reaching here with deferred work means the Low slice is spent.
        let low_paused = !self.deferred.is_empty();
        let idle = never::<Queued<D, R>>();
        let low = if low_paused { &idle } else { self.queues.lane(Priority::Low) };
        let boundary = if low_paused { at(self.budget.frame_end()) } else { never() };

        select! {
            recv(self.queues.lane(Priority::High)) -> msg => msg.map_or(Wake::Stop, Wake::Arrived),
            recv(self.queues.lane(Priority::Medium)) -> msg => msg.map_or(Wake::Stop, Wake::Arrived),
            recv(low) -> msg => msg.map_or(Wake::Stop, Wake::Arrived),
            recv(self.stop) -> _ => Wake::Stop,
            recv(boundary) -> _ => Wake::FrameBoundary,
        }
    }

    /// Process one event and hand its result to delivery. Returns the time spent.
    fn handle(&mut self, queued: Queued<D, R>) -> Duration {
        let Queued { id, event } = queued;
        let (data, meta, sink) = event.into_parts(id);
        let priority = meta.priority;
        let cancel = meta.cancel.clone();
        let metrics = self.hooks.metrics();
        let started = Instant::now();

        let result = if let Some(err) = cancel.as_ref().and_then(CancelToken::error) {
            debug!(event_id = id, %priority, error = %err, "event skipped");
            metrics.increment(Counter::Dropped(priority));
            Err(err)
        } else {
            debug!(event_id = id, %priority, kind = %meta.kind, "processing event");
            let result = match &self.processor {
                Some(handler) => processor::invoke(&self.runtime, handler.as_ref(), data, meta),
                None => Err(SchedulerError::NoProcessor),
            };
            if let Err(SchedulerError::ProcessorPanicked(msg)) = &result {
                error!(event_id = id, %priority, panic = %msg, "event processor panicked");
            }
            metrics.observe_duration(priority, started.elapsed());
            metrics.increment(Counter::Processed(priority));
            result
        };

        if let Some(sink) = sink {
            self.delivery.deliver(id, priority, sink, result, cancel);
        }
        started.elapsed()
    }

    /// Answer everything left behind with `Stopped`.
    ///
    /// Blocks until admission is closed so pushes racing the stop are seen too.
    fn flush(&mut self) {
        let mut flushed = 0usize;
        for queued in std::mem::take(&mut self.deferred) {
            self.discard(queued);
            flushed += 1;
        }
        for priority in Priority::ALL {
            while let Ok(queued) = self.queues.lane(priority).recv() {
                self.discard(queued);
                flushed += 1;
            }
        }
        if flushed > 0 {
            debug!(flushed, "pending events answered with stop");
        }
    }

    fn discard(&self, queued: Queued<D, R>) {
        let Queued { id, event } = queued;
        let priority = event.priority();
        let (_, _, sink) = event.into_parts(id);
        self.hooks.metrics().increment(Counter::Dropped(priority));
        if let Some(sink) = sink {
            self.delivery
                .deliver_now(id, priority, &sink, Err(SchedulerError::Stopped));
        }
    }
}
