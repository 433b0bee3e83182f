//! Driver state snapshot

use serde::{Deserialize, Serialize};

use crate::geometry::FrameSignals;
use crate::rate::RateSnapshot;
use crate::timers::{Condition, ConditionSet};

/// Detection output, replaced wholesale every frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionState {
    pub is_drowsy: bool,
    pub is_yawning: bool,
    pub is_distracted: bool,
    pub is_asleep_posture: bool,
    pub is_seatbelt_off: bool,

    pub ear: f64,
    pub mar: f64,
    pub yaw: f64,
    pub pitch: f64,

    /// Blinks in the last minute
    pub blink_rate: u32,
    /// Yawns in the last minute
    pub yawn_rate: u32,
    /// 0-100
    pub stress_level: u32,

    /// False when this snapshot was carried over from the last frame with a face
    pub face_detected: bool,
}

impl DetectionState {
    pub fn new(alarms: &ConditionSet, signals: &FrameSignals, rates: &RateSnapshot) -> Self {
        Self {
            is_drowsy: alarms.get(Condition::Drowsy),
            is_yawning: alarms.get(Condition::Yawning),
            is_distracted: alarms.get(Condition::Distracted),
            is_asleep_posture: alarms.get(Condition::AsleepPosture),
            is_seatbelt_off: alarms.get(Condition::SeatbeltOff),
            ear: signals.ear,
            mar: signals.mar,
            yaw: signals.yaw,
            pitch: signals.pitch,
            blink_rate: rates.blink_rate,
            yawn_rate: rates.yawn_rate,
            stress_level: rates.stress_level,
            face_detected: true,
        }
    }

    /// Alarm flags as a set
    pub fn alarms(&self) -> ConditionSet {
        let mut set = ConditionSet::default();
        set.set(Condition::Drowsy, self.is_drowsy);
        set.set(Condition::Yawning, self.is_yawning);
        set.set(Condition::Distracted, self.is_distracted);
        set.set(Condition::AsleepPosture, self.is_asleep_posture);
        set.set(Condition::SeatbeltOff, self.is_seatbelt_off);
        set
    }

    /// Drowsy or head down: the states that escalate to SOS
    pub fn is_critical(&self) -> bool {
        self.is_drowsy || self.is_asleep_posture
    }
}
