//! Cancellation and deadline handle shared between callers and the scheduler.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{at, bounded, never, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;

use super::error::SchedulerError;

struct CancelInner {
    /// Dropping the sender disconnects `done`, waking every waiter at once.
    trigger: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
    deadline: Option<Instant>,
}

/// Cloneable cancellation handle with an optional deadline.
///
/// Clones share state: cancelling one cancels all.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    /// A token that fires only when [`cancel`](Self::cancel) is called.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A token that also fires once `deadline` passes.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline))
    }

    /// A token that also fires after `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Some(Instant::now() + timeout))
    }

    fn build(deadline: Option<Instant>) -> Self {
        let (tx, rx) = bounded(0);
        Self {
            inner: Arc::new(CancelInner {
                trigger: Mutex::new(Some(tx)),
                done: rx,
                deadline,
            }),
        }
    }

    /// Fire the token. Idempotent.
    pub fn cancel(&self) {
        self.inner.trigger.lock().take();
    }

    /// Whether [`cancel`](Self::cancel) was called on this token or a clone.
    #[must_use]
    pub fn is_explicitly_cancelled(&self) -> bool {
        signalled(&self.inner.done)
    }

    /// Whether the token was cancelled or its deadline has passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.error().is_some()
    }

    /// The error describing why the token fired, if it has.
    #[must_use]
    pub fn error(&self) -> Option<SchedulerError> {
        if self.is_explicitly_cancelled() {
            return Some(SchedulerError::Cancelled);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(SchedulerError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Deadline, if one was set.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Receiver that disconnects on explicit cancel; usable in `select!`.
    pub(crate) fn done(&self) -> &Receiver<()> {
        &self.inner.done
    }

    /// Receiver that yields once the deadline passes; never yields without one.
    pub(crate) fn deadline_signal(&self) -> Receiver<Instant> {
        self.inner.deadline.map_or_else(never, at)
    }
}

/// Whether a dropped-sender broadcast channel has fired.
pub(crate) fn signalled(rx: &Receiver<()>) -> bool {
    matches!(rx.try_recv(), Err(TryRecvError::Disconnected))
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_explicitly_cancelled())
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}
