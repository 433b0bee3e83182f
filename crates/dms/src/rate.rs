//! Rolling blink/yawn rates and stress score

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::config::DetectionConfig;
use crate::geometry::FrameSignals;

/// Rate window length (ms)
pub const RATE_WINDOW_MS: i64 = 60_000;

/// Event timestamps within a trailing time window, oldest first
#[derive(Debug, Clone)]
pub struct RollingWindow {
    timestamps: VecDeque<i64>,
    window_ms: i64,
}

impl RollingWindow {
    pub fn new(window_ms: i64) -> Self {
        Self {
            timestamps: VecDeque::new(),
            window_ms,
        }
    }

    /// Record an occurrence. A wall clock that stepped backwards is held at
    /// the newest entry so the window stays sorted.
    pub fn push(&mut self, timestamp_ms: i64) {
        let timestamp_ms = match self.timestamps.back() {
            Some(&newest) => timestamp_ms.max(newest),
            None => timestamp_ms,
        };
        self.timestamps.push_back(timestamp_ms);
    }

    /// Drop entries at or before `now - window`
    pub fn evict(&mut self, now_ms: i64) {
        let cutoff = now_ms - self.window_ms;
        while self.timestamps.front().is_some_and(|&t| t <= cutoff) {
            self.timestamps.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &i64> {
        self.timestamps.iter()
    }
}

/// Rate analytics for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSnapshot {
    /// Blinks in the last 60s
    pub blink_rate: u32,
    /// Yawns in the last 60s
    pub yawn_rate: u32,
    /// Composite 0-100
    pub stress_level: u32,
}

/// Stress score: `min(100, round(blinks * 1.5 + yawns * 15))`
pub fn stress_level(blink_rate: u32, yawn_rate: u32) -> u32 {
    let score = (blink_rate as f64 * 1.5 + yawn_rate as f64 * 15.0).round();
    score.min(100.0) as u32
}

/// Counts blink and yawn onsets over a rolling minute
#[derive(Debug, Clone)]
pub struct RateTracker {
    blinks: RollingWindow,
    yawns: RollingWindow,
    was_closed: bool,
    was_yawning: bool,
}

impl Default for RateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RateTracker {
    pub fn new() -> Self {
        Self {
            blinks: RollingWindow::new(RATE_WINDOW_MS),
            yawns: RollingWindow::new(RATE_WINDOW_MS),
            was_closed: false,
            was_yawning: false,
        }
    }

    /// Feed one frame. Onsets (not sustained closure) are counted.
    pub fn update(
        &mut self,
        signals: &FrameSignals,
        config: &DetectionConfig,
        now_ms: i64,
    ) -> RateSnapshot {
        let is_closed = signals.ear < config.ear_threshold;
        if is_closed && !self.was_closed {
            self.blinks.push(now_ms);
        }
        self.was_closed = is_closed;

        let is_yawning = signals.mar > config.mar_threshold;
        if is_yawning && !self.was_yawning {
            self.yawns.push(now_ms);
        }
        self.was_yawning = is_yawning;

        self.blinks.evict(now_ms);
        self.yawns.evict(now_ms);

        let blink_rate = self.blinks.len() as u32;
        let yawn_rate = self.yawns.len() as u32;
        RateSnapshot {
            blink_rate,
            yawn_rate,
            stress_level: stress_level(blink_rate, yawn_rate),
        }
    }
}
