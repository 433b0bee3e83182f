//! Alarm decisions: rising-edge logging and the displayed alert

use serde::{Deserialize, Serialize};

use crate::timers::{Condition, ConditionSet};

/// User-facing alert text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmMessage {
    SeatbeltOff,
    EyesClosed,
    HeadDown,
    LookAhead,
    Yawning,
}

impl AlarmMessage {
    pub fn for_condition(condition: Condition) -> Self {
        match condition {
            Condition::SeatbeltOff => Self::SeatbeltOff,
            Condition::Drowsy => Self::EyesClosed,
            Condition::AsleepPosture => Self::HeadDown,
            Condition::Distracted => Self::LookAhead,
            Condition::Yawning => Self::Yawning,
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            Self::SeatbeltOff => "SEATBELT NOT DETECTED!",
            Self::EyesClosed => "WAKE UP! EYES CLOSED",
            Self::HeadDown => "HEAD DOWN DETECTED",
            Self::LookAhead => "DISTRACTED! LOOK AHEAD",
            Self::Yawning => "YAWNING DETECTED",
        }
    }
}

/// Requested audio state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoundCommand {
    Activate,
    Deactivate,
}

/// What the presentation layer should do this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmDirective {
    pub sound: SoundCommand,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<AlarmMessage>,
}

impl AlarmDirective {
    /// Pick the single highest-priority message:
    /// seatbelt > drowsy > head down > distracted > yawning
    pub fn from_alarms(alarms: &ConditionSet) -> Self {
        let top = Condition::PRIORITY.into_iter().find(|&c| alarms.get(c));
        match top {
            Some(condition) => Self {
                sound: SoundCommand::Activate,
                message: Some(AlarmMessage::for_condition(condition)),
            },
            None => Self::idle(),
        }
    }

    /// No alarm active
    pub fn idle() -> Self {
        Self {
            sound: SoundCommand::Deactivate,
            message: None,
        }
    }
}

/// Last frame's alarm flags, kept only to find 0 -> 1 transitions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlarmEdgeState {
    previous: ConditionSet,
}

impl AlarmEdgeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conditions that rose since the previous call; `current` becomes the
    /// new previous state
    pub fn rising_edges(&mut self, current: ConditionSet) -> Vec<Condition> {
        let rising = current
            .active()
            .filter(|&c| !self.previous.get(c))
            .collect();
        self.previous = current;
        rising
    }

    pub fn previous(&self) -> ConditionSet {
        self.previous
    }
}
