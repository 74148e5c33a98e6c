//! Frame budget: caps wall-clock time spent on Low work per scheduling frame.

use std::time::{Duration, Instant};

use crate::config::FrameConfig;

/// Tracks the current frame and Low-priority time spent inside it.
#[derive(Debug)]
pub(crate) struct FrameBudget {
    frame: Duration,
    /// Zero disables the ceiling.
    low_slice: Duration,
    frame_start: Instant,
    low_spent: Duration,
}

impl FrameBudget {
    pub(crate) fn new(config: &FrameConfig) -> Self {
        Self::with_durations(config.frame_duration(), config.low_slice(), Instant::now())
    }

    pub(crate) const fn with_durations(frame: Duration, low_slice: Duration, now: Instant) -> Self {
        Self {
            frame,
            low_slice,
            frame_start: now,
            low_spent: Duration::ZERO,
        }
    }

    fn roll(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.frame_start);
        if elapsed >= self.frame {
            self.frame_start = now;
            self.low_spent = Duration::ZERO;
        }
    }

    /// Whether Low work may start now.
    pub(crate) fn low_allowed(&mut self, now: Instant) -> bool {
        if self.low_slice.is_zero() {
            return true;
        }
        self.roll(now);
        self.low_spent < self.low_slice
    }

    /// Account for time spent on one Low item.
    pub(crate) fn charge_low(&mut self, elapsed: Duration) {
        self.low_spent = self.low_spent.saturating_add(elapsed);
    }

    /// When the current frame ends and the Low slice refills.
    pub(crate) fn frame_end(&self) -> Instant {
        self.frame_start + self.frame
    }
}
