//! Driver Monitoring System (DMS)
//!
//! Per-frame driver alertness classification from facial geometry:
//! - Eye/mouth aspect ratios and head pose from face-mesh landmarks
//! - Rolling blink/yawn rates and a stress score
//! - Duration-gated drowsiness, yawning, distraction and posture alarms
//! - Immediate seatbelt alarm
//! - Escalation of a persisting critical state to an SOS dispatch

pub mod clock;
pub mod config;
pub mod decision;
pub mod geometry;
pub mod rate;
pub mod state;
pub mod timers;

pub use alerting::{EmergencyConfig, SosNotification, SosPayload};
pub use clock::{FrameClock, ManualClock, SystemClock, WallClock};
pub use config::{DetectionConfig, EngineConfig};
pub use decision::{AlarmDirective, AlarmEdgeState, AlarmMessage, SoundCommand};
pub use geometry::{FaceObservation, FrameSignals, Landmark};
pub use rate::{RateSnapshot, RateTracker, RollingWindow};
pub use state::DetectionState;
pub use timers::{Condition, ConditionSet, ConditionTimers};

use alerting::SosController;
use serde::{Deserialize, Serialize};
use storage::{EventType, HistoryEvent};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Consecutive faceless frames before the loss is reported
pub const FACE_ABSENT_WARN_FRAMES: u32 = 30;

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Keypoints missing for feature calculation: need {required}, got {found}")]
    KeypointsMissing { required: usize, found: usize },
}

/// Everything the engine consumes for one frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameInput {
    /// First detected face, if any
    pub face: Option<FaceObservation>,
    /// Seatbelt sensor (or simulation) reports unbuckled
    #[serde(default)]
    pub seatbelt_off: bool,
}

/// Everything the engine emits for one frame
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub state: DetectionState,
    /// `None` on frames without a usable face: leave audio and message as they are
    pub directive: Option<AlarmDirective>,
    /// New history events, to be appended to the history sink
    pub events: Vec<HistoryEvent>,
    /// Message to hand to the messaging collaborator
    pub sos: Option<SosPayload>,
    pub notification: SosNotification,
}

/// Driver monitoring engine.
///
/// Runs extraction, rate analytics, condition timers, alarm decision and
/// escalation, in that order, once per frame. A frame without a face is
/// "no signal": nothing is incremented or reset.
#[derive(Debug, Default)]
pub struct DetectionEngine {
    rates: RateTracker,
    timers: ConditionTimers,
    edges: AlarmEdgeState,
    sos: SosController,
    last_state: DetectionState,
    face_absent_frames: u32,
}

impl DetectionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one frame.
    ///
    /// `config` is the snapshot taken at the top of the frame, `dt_secs` the
    /// frame delta and `now_ms` wall-clock time.
    pub fn process(
        &mut self,
        input: &FrameInput,
        config: &EngineConfig,
        dt_secs: f64,
        now_ms: i64,
    ) -> FrameOutcome {
        let dt_secs = clock::sanitize_delta(dt_secs);

        let signals = match input.face.as_ref().map(geometry::extract_signals) {
            Some(Ok(signals)) => signals,
            Some(Err(e)) => {
                debug!("Unusable face this frame: {}", e);
                return self.no_signal(now_ms);
            }
            None => return self.no_signal(now_ms),
        };

        if self.face_absent_frames >= FACE_ABSENT_WARN_FRAMES {
            info!("Face reacquired after {} frames", self.face_absent_frames);
        }
        self.face_absent_frames = 0;

        let detection = &config.detection;

        // Analytics
        let rates = self.rates.update(&signals, detection, now_ms);

        // Timers
        let raw = ConditionSet::evaluate(&signals, detection, input.seatbelt_off);
        self.timers.update(raw, dt_secs);
        let alarms = self.timers.alarms(raw, detection);

        // Decision
        let mut events: Vec<HistoryEvent> = self
            .edges
            .rising_edges(alarms)
            .into_iter()
            .map(|condition| {
                warn!("Alarm raised: {}", condition.event_type());
                HistoryEvent::new(condition.event_type(), now_ms)
            })
            .collect();
        let directive = AlarmDirective::from_alarms(&alarms);

        let state = DetectionState::new(&alarms, &signals, &rates);

        // Escalation
        let sos = self.sos.update(state.is_critical(), &config.emergency, dt_secs, now_ms);
        if sos.is_some() {
            events.push(HistoryEvent::new(EventType::Sos, now_ms));
        }

        self.last_state = state.clone();

        FrameOutcome {
            state,
            directive: Some(directive),
            events,
            sos,
            notification: self.sos.notification(),
        }
    }

    fn no_signal(&mut self, now_ms: i64) -> FrameOutcome {
        self.face_absent_frames = self.face_absent_frames.saturating_add(1);
        if self.face_absent_frames == FACE_ABSENT_WARN_FRAMES {
            warn!("No face for {} frames; timers frozen", FACE_ABSENT_WARN_FRAMES);
        }
        self.sos.tick(now_ms);

        let mut state = self.last_state.clone();
        state.face_detected = false;

        FrameOutcome {
            state,
            directive: None,
            events: Vec::new(),
            sos: None,
            notification: self.sos.notification(),
        }
    }

    /// The messaging collaborator accepted the last SOS hand-off
    pub fn confirm_sos(&mut self) {
        self.sos.confirm_dispatch();
    }

    /// Accumulated time for a condition (seconds)
    pub fn condition_elapsed(&self, condition: Condition) -> f64 {
        self.timers.elapsed(condition)
    }

    /// Continuous critical time toward the next SOS (seconds)
    pub fn critical_elapsed(&self) -> f64 {
        self.sos.critical_secs()
    }

    /// Number of consecutive frames without a usable face
    pub fn face_absent_frames(&self) -> u32 {
        self.face_absent_frames
    }

    /// Latest snapshot
    pub fn state(&self) -> &DetectionState {
        &self.last_state
    }

    /// Reset driver state (on driver change). SOS cooldown bookkeeping is kept.
    pub fn reset_state(&mut self) {
        let mut sos = std::mem::take(&mut self.sos);
        sos.reset_escalation();
        *self = Self {
            sos,
            ..Self::default()
        };
    }
}
