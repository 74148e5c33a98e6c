//! Leveled logging capability consumed by the scheduler.

use tracing::{debug, error, info, warn};

/// Minimal leveled logger. Never consulted for control decisions.
pub trait Logger: Send + Sync {
    /// Debug-level line.
    fn debug(&self, msg: &str);
    /// Info-level line.
    fn info(&self, msg: &str);
    /// Warning-level line.
    fn warn(&self, msg: &str);
    /// Error-level line.
    fn error(&self, msg: &str);
}

/// Logger that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn debug(&self, _msg: &str) {}
    fn info(&self, _msg: &str) {}
    fn warn(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
}

/// Logger that forwards to `tracing` under the `prometheus_event_loop` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, msg: &str) {
        debug!(target: "prometheus_event_loop", "{msg}");
    }

    fn info(&self, msg: &str) {
        info!(target: "prometheus_event_loop", "{msg}");
    }

    fn warn(&self, msg: &str) {
        warn!(target: "prometheus_event_loop", "{msg}");
    }

    fn error(&self, msg: &str) {
        error!(target: "prometheus_event_loop", "{msg}");
    }
}
