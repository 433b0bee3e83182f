//! Driver Sentinel runtime
//!
//! Drives the detection engine from a frame source and fans its outcome out
//! to the history store, the alarm sound and the SOS messaging channel.

pub mod driver;
pub mod outputs;
pub mod settings;
pub mod source;

pub use driver::{DriverSummary, FrameDriver, FrameReport};
pub use outputs::{spawn_dispatcher, AlarmSound, ChatLinkTransport, DispatchReceipt, LogAlarmSound};
pub use settings::{LoggingSettings, Settings};
pub use source::{ChannelSource, FrameObservation, FrameSource, ReplaySource};

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Monitor error types
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Frame source error: {0}")]
    Source(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Detection error: {0}")]
    Detection(#[from] dms::DmsError),

    #[error("Alert error: {0}")]
    Alert(#[from] alerting::AlertError),

    #[error("Logging error: {0}")]
    Logging(String),
}

/// Initialize logging.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), MonitorError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .map_err(|e| MonitorError::Logging(e.to_string()))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| MonitorError::Logging(e.to_string()))
}
