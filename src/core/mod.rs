//! Core scheduling abstractions: events, queues, processing and delivery.

pub mod cancel;
pub mod error;
pub mod event;
pub mod logger;
pub mod metrics;
pub mod processor;
pub mod scheduler;

pub(crate) mod delivery;
pub(crate) mod frame;
pub(crate) mod hooks;
pub(crate) mod queue;

pub use cancel::CancelToken;
pub use error::{AppResult, SchedulerError};
pub use event::{result_channel, Event, EventId, EventMeta, EventResult, Priority, ResultReceiver, ResultSink};
pub use logger::{Logger, NoopLogger, TracingLogger};
pub use metrics::{Counter, InMemoryMetrics, Metrics, MetricsSnapshot, NoopMetrics, PriorityStats};
pub use processor::EventProcessor;
pub use scheduler::{Scheduler, SchedulerState};
