//! Output collaborators: alarm sound and SOS messaging

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alerting::{AlertError, MessageTransport, SosPayload};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Continuous alarm tone. Both calls are idempotent.
pub trait AlarmSound: Send + Sync {
    fn activate(&self);
    fn deactivate(&self);
    fn is_active(&self) -> bool;
}

/// Alarm "sound" that logs its transitions
#[derive(Debug, Default)]
pub struct LogAlarmSound {
    active: AtomicBool,
}

impl LogAlarmSound {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlarmSound for LogAlarmSound {
    fn activate(&self) {
        if !self.active.swap(true, Ordering::SeqCst) {
            warn!("Alarm sound ON");
        }
    }

    fn deactivate(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            info!("Alarm sound off");
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl<T: AlarmSound + ?Sized> AlarmSound for Arc<T> {
    fn activate(&self) {
        (**self).activate()
    }

    fn deactivate(&self) {
        (**self).deactivate()
    }

    fn is_active(&self) -> bool {
        (**self).is_active()
    }
}

/// Hands the SOS text to a chat app through a `wa.me` deep link.
///
/// The opener is spawned on the tokio runtime, which reaps it once it exits,
/// so `dispatch` must run inside a runtime (the dispatcher task does).
#[derive(Debug, Clone, Default)]
pub struct ChatLinkTransport {
    open_command: Option<String>,
}

impl ChatLinkTransport {
    /// `open_command` receives the link as its only argument (e.g. `xdg-open`);
    /// without one the link is only logged
    pub fn new(open_command: Option<String>) -> Self {
        Self { open_command }
    }

    pub fn chat_link(destination_digits: &str, message_text: &str) -> String {
        format!(
            "https://wa.me/{}?text={}",
            destination_digits,
            urlencoding::encode(message_text)
        )
    }
}

impl MessageTransport for ChatLinkTransport {
    fn dispatch(&self, destination_digits: &str, message_text: &str) -> Result<String, AlertError> {
        let link = Self::chat_link(destination_digits, message_text);

        match &self.open_command {
            Some(command) => {
                Command::new(command)
                    .arg(&link)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .kill_on_drop(false)
                    .spawn()
                    .map_err(|e| AlertError::Transport(format!("{}: {}", command, e)))?;
                info!("SOS link handed to {}", command);
            }
            None => warn!("SOS link (no opener configured): {}", link),
        }

        Ok(Uuid::new_v4().to_string())
    }
}

/// Transport acknowledgement sent back to the driver loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    pub handle: String,
    pub requested_at_ms: i64,
}

/// Spawn the messaging task.
///
/// Payloads are queued on the returned sender; every accepted hand-off
/// yields a receipt. The task ends when all senders are dropped.
pub fn spawn_dispatcher<T>(
    transport: T,
    capacity: usize,
) -> (
    mpsc::Sender<SosPayload>,
    mpsc::UnboundedReceiver<DispatchReceipt>,
    JoinHandle<()>,
)
where
    T: MessageTransport + Send + 'static,
{
    let (payload_tx, mut payload_rx) = mpsc::channel::<SosPayload>(capacity);
    let (receipt_tx, receipt_rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        while let Some(payload) = payload_rx.recv().await {
            match transport.dispatch(&payload.destination, &payload.text) {
                Ok(handle) => {
                    debug!("SOS hand-off {} for {}", handle, payload.contact_name);
                    let receipt = DispatchReceipt {
                        handle,
                        requested_at_ms: payload.requested_at_ms,
                    };
                    if receipt_tx.send(receipt).is_err() {
                        debug!("Driver gone; dropping SOS receipt");
                    }
                }
                Err(e) => error!("SOS hand-off failed: {}", e),
            }
        }
        info!("SOS dispatcher stopped");
    });

    (payload_tx, receipt_rx, handle)
}
