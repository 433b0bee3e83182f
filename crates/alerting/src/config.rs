//! Emergency contact configuration

use serde::{Deserialize, Serialize};

/// Location reference embedded in the SOS text
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl Default for GeoPoint {
    fn default() -> Self {
        Self {
            lat: 40.7128,
            lon: -74.0060,
        }
    }
}

/// Emergency dispatch configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyConfig {
    /// Whether critical escalation may dispatch at all
    pub enabled: bool,

    /// Display name of the emergency contact
    pub contact_name: String,

    /// Contact number as entered; non-digits are stripped on dispatch
    pub contact_number: String,

    /// Minimum time between two dispatches (seconds)
    #[serde(alias = "cooldown")]
    pub cooldown_seconds: f64,

    /// Location reference sent with the message
    pub location: GeoPoint,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            contact_name: "Emergency Contact".to_string(),
            contact_number: String::new(),
            cooldown_seconds: 30.0,
            location: GeoPoint::default(),
        }
    }
}

impl EmergencyConfig {
    /// Cooldown window in milliseconds
    pub fn cooldown_ms(&self) -> f64 {
        self.cooldown_seconds * 1000.0
    }
}
