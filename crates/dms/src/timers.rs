//! Per-condition duration timers

use serde::{Deserialize, Serialize};
use storage::EventType;

use crate::config::DetectionConfig;
use crate::geometry::FrameSignals;

/// Monitored driver condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Drowsy,
    Yawning,
    Distracted,
    AsleepPosture,
    SeatbeltOff,
}

impl Condition {
    /// Table order
    pub const ALL: [Condition; 5] = [
        Condition::Drowsy,
        Condition::Yawning,
        Condition::Distracted,
        Condition::AsleepPosture,
        Condition::SeatbeltOff,
    ];

    /// Display priority, most safety-critical first
    pub const PRIORITY: [Condition; 5] = [
        Condition::SeatbeltOff,
        Condition::Drowsy,
        Condition::AsleepPosture,
        Condition::Distracted,
        Condition::Yawning,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// History event logged when this alarm rises
    pub fn event_type(self) -> EventType {
        match self {
            Self::Drowsy => EventType::Drowsy,
            Self::Yawning => EventType::Yawn,
            Self::Distracted => EventType::Distraction,
            Self::AsleepPosture => EventType::Posture,
            Self::SeatbeltOff => EventType::Seatbelt,
        }
    }

    /// Whether the alarm waits for `time_to_trigger`. Seatbelt alarms are immediate.
    pub fn is_timer_gated(self) -> bool {
        !matches!(self, Self::SeatbeltOff)
    }
}

/// One boolean per condition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConditionSet([bool; 5]);

impl ConditionSet {
    pub fn get(&self, condition: Condition) -> bool {
        self.0[condition.index()]
    }

    pub fn set(&mut self, condition: Condition, value: bool) {
        self.0[condition.index()] = value;
    }

    pub fn any(&self) -> bool {
        self.0.iter().any(|&v| v)
    }

    /// Conditions that are set, in table order
    pub fn active(&self) -> impl Iterator<Item = Condition> + '_ {
        Condition::ALL.into_iter().filter(|&c| self.get(c))
    }

    /// Raw (instantaneous) conditions for one frame
    pub fn evaluate(signals: &FrameSignals, config: &DetectionConfig, seatbelt_off: bool) -> Self {
        let mut raw = Self::default();
        raw.set(Condition::Drowsy, signals.ear < config.ear_threshold);
        raw.set(Condition::Yawning, signals.mar > config.mar_threshold);
        raw.set(Condition::Distracted, signals.yaw.abs() > config.yaw_threshold);
        raw.set(Condition::AsleepPosture, signals.pitch.abs() > config.pitch_threshold);
        raw.set(Condition::SeatbeltOff, seatbelt_off);
        raw
    }
}

impl FromIterator<Condition> for ConditionSet {
    fn from_iter<I: IntoIterator<Item = Condition>>(iter: I) -> Self {
        let mut set = Self::default();
        for condition in iter {
            set.set(condition, true);
        }
        set
    }
}

/// Independent accumulators: add the frame delta while a condition holds,
/// reset to zero the first frame it does not.
#[derive(Debug, Clone, Default)]
pub struct ConditionTimers {
    elapsed_secs: [f64; 5],
}

impl ConditionTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Integrate one frame of raw conditions
    pub fn update(&mut self, raw: ConditionSet, dt_secs: f64) {
        for condition in Condition::ALL {
            let timer = &mut self.elapsed_secs[condition.index()];
            if raw.get(condition) {
                *timer += dt_secs;
            } else {
                *timer = 0.0;
            }
        }
    }

    /// Alarm flags: timer strictly past `time_to_trigger`, except ungated
    /// conditions which alarm as soon as they hold
    pub fn alarms(&self, raw: ConditionSet, config: &DetectionConfig) -> ConditionSet {
        Condition::ALL
            .into_iter()
            .filter(|&c| {
                if c.is_timer_gated() {
                    self.elapsed(c) > config.time_to_trigger
                } else {
                    raw.get(c)
                }
            })
            .collect()
    }

    /// Accumulated time for a condition (seconds)
    pub fn elapsed(&self, condition: Condition) -> f64 {
        self.elapsed_secs[condition.index()]
    }
}
