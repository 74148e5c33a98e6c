//! Builder to assemble a scheduler from configuration and capabilities.

use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::core::{
    EventProcessor, Logger, Metrics, NoopLogger, NoopMetrics, Scheduler, SchedulerError,
};

/// Collects configuration, processor, logger and metrics, then builds a
/// [`Scheduler`]. Logger and metrics default to the no-op implementations.
pub struct SchedulerBuilder<D, R>
where
    D: Send + 'static,
    R: Send + 'static,
{
    config: SchedulerConfig,
    processor: Option<Arc<dyn EventProcessor<D, R>>>,
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn Metrics>,
}

impl<D, R> SchedulerBuilder<D, R>
where
    D: Send + 'static,
    R: Send + 'static,
{
    /// Start from a configuration.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            processor: None,
            logger: Arc::new(NoopLogger),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Start from `EVENT_LOOP_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` if a variable is malformed or
    /// the resulting configuration is invalid.
    pub fn from_env() -> Result<Self, SchedulerError> {
        SchedulerConfig::from_env()
            .map(Self::new)
            .map_err(|e| SchedulerError::InvalidConfig(format!("{e:#}")))
    }

    /// Set the event processor.
    #[must_use]
    pub fn processor(mut self, processor: Arc<dyn EventProcessor<D, R>>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Set the logger.
    #[must_use]
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Set the metrics sink.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Validate the configuration and build the scheduler (not yet started).
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` if the configuration is invalid.
    pub fn build(self) -> Result<Scheduler<D, R>, SchedulerError> {
        Scheduler::with_hooks(self.config, self.processor, self.logger, self.metrics)
    }
}
