//! Configuration models for queues, delivery, frames and timeouts.

pub mod scheduler;

pub use scheduler::{DeliveryConfig, DeliveryMode, FrameConfig, SchedulerConfig, ENV_PREFIX};
