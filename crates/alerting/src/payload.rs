//! Outbound SOS message

use crate::{AlertError, EmergencyConfig};
use serde::{Deserialize, Serialize};

/// Message handed to the messaging collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosPayload {
    /// Destination number, digits only
    pub destination: String,
    /// Contact display name (for notification text)
    pub contact_name: String,
    /// Prefilled emergency text
    pub text: String,
    /// Wall-clock time of the dispatch request (ms)
    pub requested_at_ms: i64,
}

impl SosPayload {
    /// Build the payload for the configured contact
    pub fn new(config: &EmergencyConfig, now_ms: i64) -> Self {
        Self {
            destination: digits_only(&config.contact_number),
            contact_name: config.contact_name.clone(),
            text: format!(
                "EMERGENCY: Driver is unresponsive/drowsy. Current Location: \
                 https://maps.google.com/?q={:.4},{:.4}",
                config.location.lat, config.location.lon
            ),
            requested_at_ms: now_ms,
        }
    }
}

/// Strip everything but ASCII digits (country code included, no '+')
pub fn digits_only(number: &str) -> String {
    number.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Outbound messaging collaborator.
///
/// Dispatch is fire-and-forget: a returned handle means the message was
/// handed off, not delivered.
pub trait MessageTransport {
    fn dispatch(&self, destination_digits: &str, message_text: &str) -> Result<String, AlertError>;
}
