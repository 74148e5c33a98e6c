//! Runtime-adjustable settings shared between callers and the workers.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::DeliveryConfig;

use super::logger::Logger;
use super::metrics::Metrics;

/// Delivery settings, logger and metrics sink; each may be replaced at any
/// time from any thread while the workers read them.
pub(crate) struct Hooks {
    delivery: RwLock<DeliveryConfig>,
    logger: RwLock<Arc<dyn Logger>>,
    metrics: RwLock<Arc<dyn Metrics>>,
}

impl Hooks {
    pub(crate) fn new(
        delivery: DeliveryConfig,
        logger: Arc<dyn Logger>,
        metrics: Arc<dyn Metrics>,
    ) -> Self {
        Self {
            delivery: RwLock::new(delivery),
            logger: RwLock::new(logger),
            metrics: RwLock::new(metrics),
        }
    }

    pub(crate) fn delivery(&self) -> DeliveryConfig {
        *self.delivery.read()
    }

    pub(crate) fn set_delivery(&self, delivery: DeliveryConfig) {
        *self.delivery.write() = delivery;
    }

    pub(crate) fn logger(&self) -> Arc<dyn Logger> {
        Arc::clone(&self.logger.read())
    }

    pub(crate) fn set_logger(&self, logger: Arc<dyn Logger>) {
        *self.logger.write() = logger;
    }

    pub(crate) fn metrics(&self) -> Arc<dyn Metrics> {
        Arc::clone(&self.metrics.read())
    }

    pub(crate) fn set_metrics(&self, metrics: Arc<dyn Metrics>) {
        *self.metrics.write() = metrics;
    }
}
