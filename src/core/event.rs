//! Event data model: priority classes, events, results and result sinks.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use super::cancel::CancelToken;
use super::error::SchedulerError;

/// Sequence number drawn for an event when it is submitted.
///
/// Numbers come from a counter owned by each scheduler and wrap on overflow.
/// Every submission to a running scheduler draws one, including submissions
/// later rejected as full or cancelled, so admitted ids are unique but not
/// contiguous.
pub type EventId = u64;

/// Priority class of an event.
///
/// The set is closed. Ordering follows precedence: `High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Served only when nothing else is pending, at most one item per iteration.
    Low,
    /// Drained after High.
    Medium,
    /// Always drained first.
    High,
}

impl Priority {
    /// All classes in draining order.
    pub const ALL: [Self; 3] = [Self::High, Self::Medium, Self::Low];

    /// Lowercase name of the class.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(SchedulerError::UnknownPriority(s.to_string())),
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = SchedulerError;

    /// `0` is High, `1` Medium, `2` Low.
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::High),
            1 => Ok(Self::Medium),
            2 => Ok(Self::Low),
            other => Err(SchedulerError::UnknownPriority(other.to_string())),
        }
    }
}

/// Outcome of processing one event.
pub type EventResult<R> = Result<R, SchedulerError>;

/// Sending half of a single-slot result channel.
pub type ResultSink<R> = Sender<EventResult<R>>;

/// Receiving half of a single-slot result channel.
pub type ResultReceiver<R> = Receiver<EventResult<R>>;

/// Create a single-slot channel for receiving one event's result.
#[must_use]
pub fn result_channel<R>() -> (ResultSink<R>, ResultReceiver<R>) {
    bounded(1)
}

/// One unit of scheduled work.
///
/// Fields are fixed once the event has been built; the scheduler only reads them.
pub struct Event<D, R> {
    priority: Priority,
    kind: String,
    data: D,
    cancel: Option<CancelToken>,
    sink: Option<ResultSink<R>>,
    submitted_at: Instant,
}

impl<D, R> Event<D, R> {
    /// Create a fire-and-forget event with no cancellation handle.
    pub fn new(priority: Priority, kind: impl Into<String>, data: D) -> Self {
        Self {
            priority,
            kind: kind.into(),
            data,
            cancel: None,
            sink: None,
            submitted_at: Instant::now(),
        }
    }

    /// Attach a cancellation/deadline handle.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Attach a result sink; the event then receives exactly one delivery outcome.
    #[must_use]
    pub fn with_result_sink(mut self, sink: ResultSink<R>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Priority class.
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Type tag.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Payload.
    pub const fn data(&self) -> &D {
        &self.data
    }

    /// Cancellation handle, if any.
    pub const fn cancel(&self) -> Option<&CancelToken> {
        self.cancel.as_ref()
    }

    /// Whether a result sink is attached.
    pub const fn has_result_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Construction timestamp.
    pub const fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    pub(crate) fn into_parts(self, id: EventId) -> (D, EventMeta, Option<ResultSink<R>>) {
        let meta = EventMeta {
            id,
            priority: self.priority,
            kind: self.kind,
            cancel: self.cancel,
            submitted_at: self.submitted_at,
        };
        (self.data, meta, self.sink)
    }
}

impl<D: fmt::Debug, R> fmt::Debug for Event<D, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("priority", &self.priority)
            .field("kind", &self.kind)
            .field("data", &self.data)
            .field("cancel", &self.cancel)
            .field("has_result_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

/// Event metadata handed to the processor alongside the payload.
#[derive(Debug, Clone)]
pub struct EventMeta {
    /// Sequence number assigned at admission.
    pub id: EventId,
    /// Priority class.
    pub priority: Priority,
    /// Type tag.
    pub kind: String,
    /// Cancellation handle, if any.
    pub cancel: Option<CancelToken>,
    /// Construction timestamp.
    pub submitted_at: Instant,
}

impl EventMeta {
    /// Time elapsed since the event was constructed.
    #[must_use]
    pub fn queued_for(&self) -> Duration {
        self.submitted_at.elapsed()
    }
}

/// An admitted event waiting in a queue or in the deferred-low buffer.
pub(crate) struct Queued<D, R> {
    pub id: EventId,
    pub event: Event<D, R>,
}
