//! Bounded per-priority queues.
//!
//! Each priority class gets its own fixed-capacity `crossbeam_channel`.
//! Producers push through [`PriorityQueues`]; the scheduling worker owns the
//! [`QueueReceivers`]. Closing the queues drops every sender so the worker's
//! final flush observes disconnection once in-flight pushes have landed.

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use parking_lot::RwLock;

use super::cancel::CancelToken;
use super::error::SchedulerError;
use super::event::{Priority, Queued};

type Lanes<T> = [T; 3];

/// Receiving side of the three queues, indexed by [`Priority::index`].
pub(crate) struct QueueReceivers<D, R> {
    lanes: Lanes<Receiver<Queued<D, R>>>,
}

impl<D, R> QueueReceivers<D, R> {
    pub(crate) const fn lane(&self, priority: Priority) -> &Receiver<Queued<D, R>> {
        &self.lanes[priority.index()]
    }
}

/// Producer side of the three bounded queues.
pub(crate) struct PriorityQueues<D, R> {
    /// `None` once admission is closed.
    senders: RwLock<Option<Lanes<Sender<Queued<D, R>>>>>,
    /// Receiver clones kept only to report depth; never read from.
    observers: Lanes<Receiver<Queued<D, R>>>,
    capacity: usize,
}

impl<D, R> PriorityQueues<D, R> {
    /// Create three queues of `capacity` each.
    pub(crate) fn new(capacity: usize) -> (Self, QueueReceivers<D, R>) {
        let (high_tx, high_rx) = bounded(capacity);
        let (medium_tx, medium_rx) = bounded(capacity);
        let (low_tx, low_rx) = bounded(capacity);
        let queues = Self {
            senders: RwLock::new(Some([high_tx, medium_tx, low_tx])),
            observers: [high_rx.clone(), medium_rx.clone(), low_rx.clone()],
            capacity,
        };
        (queues, QueueReceivers { lanes: [high_rx, medium_rx, low_rx] })
    }

    /// Enqueue without blocking.
    pub(crate) fn try_push(&self, queued: Queued<D, R>) -> Result<(), SchedulerError> {
        let priority = queued.event.priority();
        let senders = self.senders.read();
        let Some(lanes) = senders.as_ref() else {
            return Err(SchedulerError::NotRunning);
        };
        match lanes[priority.index()].try_send(queued) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SchedulerError::QueueFull(priority)),
            Err(TrySendError::Disconnected(_)) => Err(SchedulerError::Stopped),
        }
    }

    /// Enqueue, waiting for space until `ctx` fires or `stop` disconnects.
    pub(crate) fn push_blocking(
        &self,
        queued: Queued<D, R>,
        ctx: &CancelToken,
        stop: &Receiver<()>,
    ) -> Result<(), SchedulerError> {
        if let Some(err) = ctx.error() {
            return Err(err);
        }
        let priority = queued.event.priority();
        let senders = self.senders.read();
        let Some(lanes) = senders.as_ref() else {
            return Err(SchedulerError::NotRunning);
        };
        let lane = &lanes[priority.index()];
        let queued = match lane.try_send(queued) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Disconnected(_)) => return Err(SchedulerError::Stopped),
            Err(TrySendError::Full(queued)) => queued,
        };
        let deadline = ctx.deadline_signal();
        select! {
            send(lane, queued) -> res => res.map_err(|_| SchedulerError::Stopped),
            recv(ctx.done()) -> _ => Err(SchedulerError::Cancelled),
            recv(deadline) -> _ => Err(SchedulerError::DeadlineExceeded),
            recv(stop) -> _ => Err(SchedulerError::Stopped),
        }
    }

    /// Stop admitting events. Waits for in-flight pushes to release the lock.
    pub(crate) fn close(&self) {
        self.senders.write().take();
    }

    /// Number of events currently buffered for `priority`.
    pub(crate) fn len(&self, priority: Priority) -> usize {
        self.observers[priority.index()].len()
    }

    /// Capacity of each queue.
    pub(crate) const fn capacity(&self) -> usize {
        self.capacity
    }
}
