//! Error types for scheduler operations.

use thiserror::Error;

use super::event::Priority;

/// Errors produced by the scheduler, surfaced either to submitters or inside
/// a delivered [`EventResult`](super::EventResult).
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scheduler has not been started or has already been stopped.
    #[error("scheduler is not running")]
    NotRunning,
    /// The scheduler stopped while the operation was in flight.
    #[error("scheduler stopped")]
    Stopped,
    /// No event processor is configured.
    #[error("no event processor configured")]
    NoProcessor,
    /// The queue for the given priority has no free capacity.
    #[error("{0} priority queue is full")]
    QueueFull(Priority),
    /// A priority value outside the closed set of classes.
    #[error("unknown priority: {0}")]
    UnknownPriority(String),
    /// The caller-supplied cancellation handle fired.
    #[error("operation cancelled")]
    Cancelled,
    /// The caller-supplied deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// The event processor panicked; the payload is the panic message.
    #[error("event processor panicked: {0}")]
    ProcessorPanicked(String),
    /// The event processor reported a failure.
    #[error("event processor failed: {0}")]
    Processor(#[from] anyhow::Error),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The scheduling runtime or one of its threads could not be created.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl SchedulerError {
    /// Wrap an arbitrary message as a processor failure.
    pub fn processor(msg: impl std::fmt::Display) -> Self {
        Self::Processor(anyhow::anyhow!("{msg}"))
    }

    /// Whether this error came from a cancellation or deadline handle.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
