//! Alerting System
//!
//! Escalates a persisting critical driver state into an emergency dispatch:
//! - Critical-condition escalation timer
//! - Dispatch cooldown gate
//! - Outbound SOS payload construction
//! - Transient SOS notification lifecycle

mod config;
mod escalation;
mod notification;
mod payload;

pub use config::{EmergencyConfig, GeoPoint};
pub use escalation::{SosController, ESCALATION_THRESHOLD_SECS};
pub use notification::{SosNotification, NOTIFICATION_DISPLAY_MS};
pub use payload::{digits_only, MessageTransport, SosPayload};

use thiserror::Error;

/// Alerting error types
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Message transport failed: {0}")]
    Transport(String),

    #[error("Transport channel closed")]
    ChannelClosed,
}
