//! # Prometheus Event Loop
//!
//! A single-worker priority event loop for interactive workloads.
//!
//! Producers on any thread submit events tagged High, Medium or Low. One
//! dedicated scheduling thread drains them in strict priority order: every
//! buffered High event first, then every buffered Medium event, and Low events
//! only when nothing else is pending and the current frame's Low slice has
//! time left. Each event goes through a user-supplied [`EventProcessor`] and
//! its result is delivered to an optional single-slot result sink.
//!
//! ## Key Features
//!
//! - **Strict precedence**: High preempts Medium and Low at every iteration
//! - **Frame budget**: Low work is capped per frame so it cannot eat the frame
//! - **Bounded queues**: non-blocking `submit` and cancellable `submit_blocking`
//! - **Two delivery modes**: inline on the scheduling thread, or a dispatch
//!   thread that never blocks the scheduler on a slow consumer
//! - **Panic boundary**: a panicking processor yields an error result and the
//!   loop keeps running
//! - **Graceful stop**: pending events are answered with `Stopped`
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use prometheus_event_loop::builders::SchedulerBuilder;
//! use prometheus_event_loop::config::{DeliveryMode, SchedulerConfig};
//! use prometheus_event_loop::core::{result_channel, Event, Priority};
//!
//! let scheduler = SchedulerBuilder::new(
//!         SchedulerConfig::new()
//!             .with_queue_capacity(64)
//!             .with_delivery(DeliveryMode::Async, Duration::from_millis(100)),
//!     )
//!     .processor(Arc::new(my_processor))
//!     .build()?;
//! scheduler.start()?;
//!
//! let (sink, rx) = result_channel();
//! scheduler.submit(Event::new(Priority::High, "input", payload).with_result_sink(sink))?;
//! let result = rx.recv_timeout(Duration::from_secs(1))?;
//!
//! scheduler.stop();
//! ```
//!
//! [`EventProcessor`]: core::EventProcessor

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Builders to construct schedulers from configuration.
pub mod builders;
/// Configuration models for queues, delivery, frames and timeouts.
pub mod config;
/// Core scheduling abstractions: events, queues, processing and delivery.
pub mod core;
/// Shared utilities.
pub mod util;
