//! History event records

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Length of generated event ids
const ID_LEN: usize = 9;

/// Kind of logged occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Drowsy,
    Yawn,
    Distraction,
    Posture,
    Seatbelt,
    Sos,
}

impl EventType {
    /// All event types, in declaration order
    pub const ALL: [EventType; 6] = [
        EventType::Drowsy,
        EventType::Yawn,
        EventType::Distraction,
        EventType::Posture,
        EventType::Seatbelt,
        EventType::Sos,
    ];

    /// Wire name, as persisted
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drowsy => "drowsy",
            Self::Yawn => "yawn",
            Self::Distraction => "distraction",
            Self::Posture => "posture",
            Self::Seatbelt => "seatbelt",
            Self::Sos => "sos",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single logged alarm or SOS occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Wall-clock time in milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl HistoryEvent {
    /// Create an event with a freshly generated id
    pub fn new(event_type: EventType, timestamp: i64) -> Self {
        Self {
            id: generate_id(),
            event_type,
            timestamp,
        }
    }
}

/// Short lowercase base-36 id taken from a random uuid
fn generate_id() -> String {
    let mut value = Uuid::new_v4().as_u128();
    let mut id = String::with_capacity(ID_LEN);
    for _ in 0..ID_LEN {
        let digit = (value % 36) as u32;
        value /= 36;
        // digit < 36 always has a base-36 char
        id.push(char::from_digit(digit, 36).unwrap_or('0'));
    }
    id
}
