//! Frame clock and wall clock

use std::sync::atomic::{AtomicI64, Ordering};

/// Largest frame delta credited to the timers (seconds). Longer gaps are stalls.
pub const MAX_FRAME_DELTA_SECS: f64 = 1.0;

/// Clamp a frame delta to `[0, MAX_FRAME_DELTA_SECS]`; non-finite becomes 0
pub fn sanitize_delta(dt_secs: f64) -> f64 {
    if dt_secs.is_finite() && dt_secs > 0.0 {
        dt_secs.min(MAX_FRAME_DELTA_SECS)
    } else {
        0.0
    }
}

/// Per-frame delta from successive frame timestamps
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    last_frame_ms: Option<f64>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame time and return the sanitized delta since the previous
    /// frame. The first frame yields 0.
    pub fn advance(&mut self, frame_time_ms: f64) -> f64 {
        let dt = match self.last_frame_ms {
            Some(last) => (frame_time_ms - last) / 1000.0,
            None => 0.0,
        };
        self.last_frame_ms = Some(frame_time_ms);
        sanitize_delta(dt)
    }

    /// Forget the previous frame (after the source restarts)
    pub fn reset(&mut self) {
        self.last_frame_ms = None;
    }
}

/// Wall-clock source used for rolling windows, cooldowns and event times
pub trait WallClock: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_ms(&self) -> i64;
}

/// System time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for replays and tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::Relaxed);
    }
}

impl WallClock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::Relaxed)
    }
}
