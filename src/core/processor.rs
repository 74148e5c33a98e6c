//! Event processor capability and the protective call boundary around it.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use async_trait::async_trait;
use tokio::runtime::Runtime;

use super::error::SchedulerError;
use super::event::{EventMeta, EventResult};

/// Business logic that interprets an event's payload.
///
/// The scheduling worker drives each call to completion on its own
/// current-thread runtime before moving to the next event, so
/// implementations should return promptly. No timeout or retry is imposed.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_event_loop::core::{EventMeta, EventProcessor, EventResult};
///
/// struct Echo;
///
/// #[async_trait]
/// impl EventProcessor<String, String> for Echo {
///     async fn process(&self, data: String, meta: EventMeta) -> EventResult<String> {
///         Ok(format!("{}: {data}", meta.kind))
///     }
/// }
/// ```
#[async_trait]
pub trait EventProcessor<D, R>: Send + Sync + 'static
where
    D: Send + 'static,
    R: Send + 'static,
{
    /// Process one event and produce its result.
    async fn process(&self, data: D, meta: EventMeta) -> EventResult<R>;
}

/// Run the processor, converting a panic into an error result.
pub(crate) fn invoke<D, R>(
    runtime: &Runtime,
    processor: &dyn EventProcessor<D, R>,
    data: D,
    meta: EventMeta,
) -> EventResult<R>
where
    D: Send + 'static,
    R: Send + 'static,
{
    catch_unwind(AssertUnwindSafe(|| runtime.block_on(processor.process(data, meta))))
        .unwrap_or_else(|panic| Err(SchedulerError::ProcessorPanicked(panic_message(panic.as_ref()))))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
