//! Layered settings: defaults, optional TOML file, `SENTINEL__*` environment

use std::path::{Path, PathBuf};

use config::{Config, ConfigBuilder, Environment, File};
use config::builder::DefaultState;
use dms::{DetectionConfig, EmergencyConfig, EngineConfig};
use serde::Deserialize;
use tracing::info;

use crate::MonitorError;

/// Settings file read when `SENTINEL_CONFIG` is unset
pub const DEFAULT_SETTINGS_FILE: &str = "driver-sentinel.toml";

/// Environment variable overriding the settings file path
pub const SETTINGS_PATH_VAR: &str = "SENTINEL_CONFIG";

/// Threshold preset used as the base layer for `detection.*`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Default,
    Strict,
    Lenient,
}

impl Profile {
    pub fn detection(&self) -> DetectionConfig {
        match self {
            Self::Default => DetectionConfig::default(),
            Self::Strict => DetectionConfig::strict(),
            Self::Lenient => DetectionConfig::lenient(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    pub max_events: usize,
    /// JSON file loaded at start and written at shutdown
    pub path: Option<PathBuf>,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            max_events: storage::DEFAULT_MAX_EVENTS,
            path: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// JSON-lines frame recording
    pub replay_path: Option<PathBuf>,
    /// Sleep between frames to honour recorded timestamps
    pub realtime: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MessagingSettings {
    /// Command that receives the chat link as its only argument
    pub open_command: Option<String>,
}

/// Full runtime settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub profile: Profile,
    pub detection: DetectionConfig,
    pub emergency: EmergencyConfig,
    pub history: HistorySettings,
    pub logging: LoggingSettings,
    pub source: SourceSettings,
    pub messaging: MessagingSettings,
}

impl Settings {
    /// Load from the file named by `SENTINEL_CONFIG` (or the default file)
    /// and the environment
    pub fn load() -> Result<Self, MonitorError> {
        let path = std::env::var(SETTINGS_PATH_VAR)
            .unwrap_or_else(|_| DEFAULT_SETTINGS_FILE.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load with an explicit settings file; a missing file is not an error
    pub fn load_from(path: &Path) -> Result<Self, MonitorError> {
        let name = path.to_string_lossy();

        // First pass only resolves the profile
        let profile: Profile = layered(Config::builder(), &name)
            .build()?
            .get::<Profile>("profile")
            .unwrap_or_default();

        let base = profile.detection();
        let builder = Config::builder()
            .set_default("detection.ear_threshold", base.ear_threshold)?
            .set_default("detection.mar_threshold", base.mar_threshold)?
            .set_default("detection.yaw_threshold", base.yaw_threshold)?
            .set_default("detection.pitch_threshold", base.pitch_threshold)?
            .set_default("detection.time_to_trigger", base.time_to_trigger)?;

        let settings: Settings = layered(builder, &name).build()?.try_deserialize()?;
        settings.validate()?;

        info!(
            "Settings loaded ({:?} profile, SOS {})",
            settings.profile,
            if settings.emergency.enabled { "enabled" } else { "disabled" }
        );
        Ok(settings)
    }

    /// Engine snapshot for the config channel
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            detection: self.detection.clone(),
            emergency: self.emergency.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        self.engine_config().validate()?;
        if self.history.max_events == 0 {
            return Err(MonitorError::Settings(config::ConfigError::Message(
                "history.max_events must be at least 1".to_string(),
            )));
        }
        Ok(())
    }
}

fn layered(builder: ConfigBuilder<DefaultState>, file: &str) -> ConfigBuilder<DefaultState> {
    builder
        .add_source(File::with_name(file).required(false))
        .add_source(
            Environment::with_prefix("SENTINEL")
                .separator("__")
                .try_parsing(true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_settings(name: &str, body: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.toml", name, std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let settings = Settings::load_from(Path::new("/nonexistent/driver-sentinel.toml")).unwrap();
        assert_eq!(settings.detection, DetectionConfig::default());
        assert_eq!(settings.history.max_events, 1000);
        assert!(!settings.emergency.enabled);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = write_settings(
            "sentinel-file",
            r#"
            [detection]
            ear_threshold = 0.2

            [emergency]
            enabled = true
            contact_number = "+1 555 0100"
            cooldown = 60

            [logging]
            json = true
            "#,
        );
        let settings = Settings::load_from(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.detection.ear_threshold, 0.2);
        assert_eq!(settings.detection.mar_threshold, 0.60);
        assert!(settings.emergency.enabled);
        assert_eq!(settings.emergency.cooldown_seconds, 60.0);
        assert!(settings.logging.json);
    }

    #[test]
    fn test_profile_is_base_layer() {
        let path = write_settings(
            "sentinel-profile",
            r#"
            profile = "strict"

            [detection]
            yaw_threshold = 50.0
            "#,
        );
        let settings = Settings::load_from(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let strict = DetectionConfig::strict();
        assert_eq!(settings.profile, Profile::Strict);
        assert_eq!(settings.detection.ear_threshold, strict.ear_threshold);
        assert_eq!(settings.detection.yaw_threshold, 50.0);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let path = write_settings(
            "sentinel-invalid",
            r#"
            [detection]
            time_to_trigger = -1.0
            "#,
        );
        let result = Settings::load_from(&path);
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(MonitorError::Detection(_))));
    }
}
