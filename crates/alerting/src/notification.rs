//! SOS notification lifecycle

use serde::{Deserialize, Serialize};

/// How long a notification stays visible after a dispatch (ms)
pub const NOTIFICATION_DISPLAY_MS: i64 = 8000;

/// Transient UI notification for an SOS dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "lowercase")]
pub enum SosNotification {
    #[default]
    Hidden,
    /// Dispatch requested, hand-off not yet confirmed
    Sending { since_ms: i64 },
    /// Transport confirmed the hand-off
    Sent { since_ms: i64 },
}

impl SosNotification {
    /// Whether the notification should be shown
    pub fn is_visible(&self) -> bool {
        !matches!(self, Self::Hidden)
    }

    /// Start a new display window
    pub fn begin(&mut self, now_ms: i64) {
        *self = Self::Sending { since_ms: now_ms };
    }

    /// Mark the dispatch as handed off. The display window is not extended.
    pub fn confirm(&mut self) {
        if let Self::Sending { since_ms } = *self {
            *self = Self::Sent { since_ms };
        }
    }

    /// Revert to hidden once the display window has elapsed
    pub fn tick(&mut self, now_ms: i64) {
        let since = match *self {
            Self::Hidden => return,
            Self::Sending { since_ms } | Self::Sent { since_ms } => since_ms,
        };
        if now_ms - since >= NOTIFICATION_DISPLAY_MS {
            *self = Self::Hidden;
        }
    }
}
