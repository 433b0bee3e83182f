//! DMS configuration

use alerting::EmergencyConfig;
use serde::{Deserialize, Serialize};

use crate::DmsError;

/// Detection thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Eye aspect ratio below which the eyes count as closed
    pub ear_threshold: f64,

    /// Mouth aspect ratio above which the mouth counts as yawning
    pub mar_threshold: f64,

    /// Head turn beyond which the driver is looking away (degrees)
    pub yaw_threshold: f64,

    /// Head tilt beyond which the head is down (degrees)
    pub pitch_threshold: f64,

    /// Continuous time a condition must hold before its alarm (seconds)
    pub time_to_trigger: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            ear_threshold: 0.22,
            mar_threshold: 0.60,
            yaw_threshold: 45.0,
            pitch_threshold: 25.0,
            time_to_trigger: 1.5,
        }
    }
}

impl DetectionConfig {
    /// Create strict config (quicker, more sensitive alarms)
    pub fn strict() -> Self {
        Self {
            ear_threshold: 0.25,
            yaw_threshold: 30.0,
            pitch_threshold: 20.0,
            time_to_trigger: 1.0,
            ..Default::default()
        }
    }

    /// Create lenient config (fewer false alarms)
    pub fn lenient() -> Self {
        Self {
            ear_threshold: 0.18,
            mar_threshold: 0.75,
            yaw_threshold: 60.0,
            pitch_threshold: 35.0,
            time_to_trigger: 2.5,
        }
    }

    /// Check value ranges. The engine itself never validates; this is for
    /// whatever surface edits the configuration.
    pub fn validate(&self) -> Result<(), DmsError> {
        let ratios = [
            ("ear_threshold", self.ear_threshold),
            ("mar_threshold", self.mar_threshold),
        ];
        for (name, value) in ratios {
            if !value.is_finite() || value <= 0.0 || value >= 1.0 {
                return Err(DmsError::Config(format!(
                    "{} must be in (0, 1), got {}",
                    name, value
                )));
            }
        }

        let positives = [
            ("yaw_threshold", self.yaw_threshold),
            ("pitch_threshold", self.pitch_threshold),
            ("time_to_trigger", self.time_to_trigger),
        ];
        for (name, value) in positives {
            if !value.is_finite() || value <= 0.0 {
                return Err(DmsError::Config(format!(
                    "{} must be > 0, got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }
}

/// Configuration snapshot read once at the top of every frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub detection: DetectionConfig,
    pub emergency: EmergencyConfig,
}

impl EngineConfig {
    /// Validate both sections
    pub fn validate(&self) -> Result<(), DmsError> {
        self.detection.validate()?;
        let cooldown = self.emergency.cooldown_seconds;
        if !cooldown.is_finite() || cooldown < 0.0 {
            return Err(DmsError::Config(format!(
                "cooldown_seconds must be >= 0, got {}",
                cooldown
            )));
        }
        Ok(())
    }
}
