//! Critical-state escalation and SOS dispatch gating

use crate::{EmergencyConfig, SosNotification, SosPayload};
use tracing::{debug, info, warn};

/// Continuous critical time before an SOS is requested (seconds)
pub const ESCALATION_THRESHOLD_SECS: f64 = 5.0;

/// Escalation controller.
///
/// A second-order timer over the critical alarm (drowsy or head-down). Each
/// time it passes the escalation threshold it requests a dispatch and re-arms
/// from zero; the dispatch itself is gated by the contact cooldown, so a
/// driver who stays critical is re-notified every
/// `max(ESCALATION_THRESHOLD_SECS, cooldown)` seconds.
#[derive(Debug, Clone, Default)]
pub struct SosController {
    /// Continuous critical time (seconds)
    critical_secs: f64,
    /// Wall-clock time of the last dispatch that went out
    last_dispatch_ms: Option<i64>,
    /// Dispatches that went out
    dispatch_count: usize,
    /// Dispatches suppressed by the cooldown
    suppressed_count: usize,
    notification: SosNotification,
}

impl SosController {
    /// Create an idle controller
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance one frame.
    ///
    /// Returns the payload to hand to the messaging collaborator when a
    /// dispatch goes out this frame.
    pub fn update(
        &mut self,
        critical_alarm: bool,
        config: &EmergencyConfig,
        dt_secs: f64,
        now_ms: i64,
    ) -> Option<SosPayload> {
        self.notification.tick(now_ms);

        if !(critical_alarm && config.enabled) {
            self.critical_secs = 0.0;
            return None;
        }

        self.critical_secs += dt_secs;
        if self.critical_secs <= ESCALATION_THRESHOLD_SECS {
            return None;
        }

        warn!(
            "Driver critical for {:.1}s, requesting SOS dispatch",
            self.critical_secs
        );
        self.critical_secs = 0.0;
        self.try_dispatch(config, now_ms)
    }

    /// Request a dispatch, subject to the cooldown
    pub fn try_dispatch(&mut self, config: &EmergencyConfig, now_ms: i64) -> Option<SosPayload> {
        if let Some(last) = self.last_dispatch_ms {
            let elapsed = (now_ms - last) as f64;
            if elapsed < config.cooldown_ms() {
                self.suppressed_count += 1;
                debug!(
                    "SOS suppressed: {}ms since last dispatch < cooldown {}ms",
                    elapsed,
                    config.cooldown_ms()
                );
                return None;
            }
        }

        self.last_dispatch_ms = Some(now_ms);
        self.dispatch_count += 1;
        self.notification.begin(now_ms);

        let payload = SosPayload::new(config, now_ms);
        if payload.destination.is_empty() {
            warn!("SOS dispatched with empty destination for {}", payload.contact_name);
        }
        info!(
            "SOS dispatch #{} to {} ({})",
            self.dispatch_count, payload.contact_name, payload.destination
        );
        Some(payload)
    }

    /// Advance the notification display window without touching escalation
    pub fn tick(&mut self, now_ms: i64) {
        self.notification.tick(now_ms);
    }

    /// The messaging collaborator accepted the hand-off
    pub fn confirm_dispatch(&mut self) {
        self.notification.confirm();
    }

    /// Continuous critical time (seconds)
    pub fn critical_secs(&self) -> f64 {
        self.critical_secs
    }

    /// Time of the last dispatch, if any
    pub fn last_dispatch_ms(&self) -> Option<i64> {
        self.last_dispatch_ms
    }

    /// Number of dispatches that went out
    pub fn dispatch_count(&self) -> usize {
        self.dispatch_count
    }

    /// Number of dispatches suppressed by the cooldown
    pub fn suppressed_count(&self) -> usize {
        self.suppressed_count
    }

    /// Current notification state
    pub fn notification(&self) -> SosNotification {
        self.notification
    }

    /// Drop accumulated critical time; cooldown bookkeeping is kept
    pub fn reset_escalation(&mut self) {
        self.critical_secs = 0.0;
    }
}
