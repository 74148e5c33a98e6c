//! Scheduler configuration structures.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::core::AppResult;

/// Prefix of environment variables read by [`SchedulerConfig::from_env`].
pub const ENV_PREFIX: &str = "EVENT_LOOP_";

/// How results are handed to result sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Delivered by the scheduling worker right after processing.
    #[default]
    Inline,
    /// Delivered by a dedicated dispatch worker with bounded retry.
    Async,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inline => "inline",
            Self::Async => "async",
        })
    }
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(Self::Inline),
            "async" => Ok(Self::Async),
            other => Err(format!("unknown delivery mode `{other}`")),
        }
    }
}

/// Delivery mode with its timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Inline or asynchronous delivery.
    pub mode: DeliveryMode,
    /// Delivery timeout in milliseconds. Zero waits until cancel or stop.
    pub timeout_ms: u64,
}

impl DeliveryConfig {
    /// Build from a mode and a timeout.
    #[must_use]
    pub fn new(mode: DeliveryMode, timeout: Duration) -> Self {
        Self {
            mode,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Timeout as a duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::Inline,
            timeout_ms: 1_000,
        }
    }
}

/// Frame cadence and the Low-priority slice inside each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Scheduling frames per second.
    pub target_fps: u32,
    /// Wall-clock milliseconds Low work may use per frame. Zero disables the ceiling.
    pub low_slice_ms: u64,
}

impl FrameConfig {
    /// Length of one frame.
    #[must_use]
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs(1) / self.target_fps.max(1)
    }

    /// Low-priority slice per frame.
    #[must_use]
    pub const fn low_slice(&self) -> Duration {
        Duration::from_millis(self.low_slice_ms)
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            target_fps: 20,
            low_slice_ms: 10,
        }
    }
}

/// Root scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Capacity of each of the three priority queues.
    pub queue_capacity: usize,
    /// Capacity of the asynchronous callback-dispatch queue.
    pub callback_queue_capacity: usize,
    /// Result delivery settings.
    pub delivery: DeliveryConfig,
    /// Frame budget settings.
    pub frame: FrameConfig,
    /// How long `start` waits for the worker to report ready, in milliseconds.
    pub readiness_timeout_ms: u64,
    /// How long `stop` waits for the worker to exit, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            callback_queue_capacity: 256,
            delivery: DeliveryConfig::default(),
            frame: FrameConfig::default(),
            readiness_timeout_ms: 500,
            shutdown_timeout_ms: 2_000,
        }
    }
}

impl SchedulerConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capacity of each priority queue.
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the capacity of the callback-dispatch queue.
    #[must_use]
    pub const fn with_callback_queue_capacity(mut self, capacity: usize) -> Self {
        self.callback_queue_capacity = capacity;
        self
    }

    /// Set the delivery mode and timeout.
    #[must_use]
    pub fn with_delivery(mut self, mode: DeliveryMode, timeout: Duration) -> Self {
        self.delivery = DeliveryConfig::new(mode, timeout);
        self
    }

    /// Set frame cadence and Low slice.
    #[must_use]
    pub const fn with_frame(mut self, target_fps: u32, low_slice_ms: u64) -> Self {
        self.frame = FrameConfig {
            target_fps,
            low_slice_ms,
        };
        self
    }

    /// Set the readiness timeout.
    #[must_use]
    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the shutdown timeout.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Readiness timeout as a duration.
    #[must_use]
    pub const fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    /// Shutdown timeout as a duration.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be greater than 0".into());
        }
        if self.callback_queue_capacity == 0 {
            return Err("callback_queue_capacity must be greater than 0".into());
        }
        if self.frame.target_fps == 0 || self.frame.target_fps > 1_000 {
            return Err("frame.target_fps must be between 1 and 1000".into());
        }
        if self.frame.low_slice() > self.frame.frame_duration() {
            return Err(format!(
                "frame.low_slice_ms ({}) must not exceed the frame length ({:?})",
                self.frame.low_slice_ms,
                self.frame.frame_duration()
            ));
        }
        if self.readiness_timeout_ms == 0 {
            return Err("readiness_timeout_ms must be greater than 0".into());
        }
        if self.shutdown_timeout_ms == 0 {
            return Err("shutdown_timeout_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from `EVENT_LOOP_*` environment variables, reading a
    /// `.env` file first if one exists. Unset variables keep their defaults.
    pub fn from_env() -> AppResult<Self> {
        // A missing .env file is normal.
        let _ = dotenvy::dotenv();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut cfg = Self::default();

        if let Some(v) = var("QUEUE_CAPACITY") {
            cfg.queue_capacity = v.parse().context("EVENT_LOOP_QUEUE_CAPACITY")?;
        }
        if let Some(v) = var("CALLBACK_QUEUE_CAPACITY") {
            cfg.callback_queue_capacity = v.parse().context("EVENT_LOOP_CALLBACK_QUEUE_CAPACITY")?;
        }
        if let Some(v) = var("DELIVERY_MODE") {
            cfg.delivery.mode = v.parse().map_err(|e: String| anyhow!(e))?;
        }
        if let Some(v) = var("DELIVERY_TIMEOUT_MS") {
            cfg.delivery.timeout_ms = v.parse().context("EVENT_LOOP_DELIVERY_TIMEOUT_MS")?;
        }
        if let Some(v) = var("TARGET_FPS") {
            cfg.frame.target_fps = v.parse().context("EVENT_LOOP_TARGET_FPS")?;
        }
        if let Some(v) = var("LOW_SLICE_MS") {
            cfg.frame.low_slice_ms = v.parse().context("EVENT_LOOP_LOW_SLICE_MS")?;
        }
        if let Some(v) = var("READINESS_TIMEOUT_MS") {
            cfg.readiness_timeout_ms = v.parse().context("EVENT_LOOP_READINESS_TIMEOUT_MS")?;
        }
        if let Some(v) = var("SHUTDOWN_TIMEOUT_MS") {
            cfg.shutdown_timeout_ms = v.parse().context("EVENT_LOOP_SHUTDOWN_TIMEOUT_MS")?;
        }

        cfg.validate().map_err(|e| anyhow!(e))?;
        Ok(cfg)
    }
}
