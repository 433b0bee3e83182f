//! Driver Sentinel - Main Entry Point

use std::sync::Arc;

use monitor::{
    init_logging, spawn_dispatcher, ChatLinkTransport, FrameDriver, LogAlarmSound, MonitorError,
    ReplaySource, Settings,
};
use dms::{SystemClock, WallClock};
use storage::HistoryRepository;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Pending SOS requests between the driver and the messaging task
const SOS_QUEUE_DEPTH: usize = 4;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load()?;
    init_logging(&settings.logging)?;

    info!("=== Driver Sentinel v{} ===", env!("CARGO_PKG_VERSION"));

    let history = Arc::new(load_history(&settings).await?);

    let (config_tx, config_rx) = watch::channel(settings.engine_config());
    let (stop_tx, stop_rx) = watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, stopping"),
            Err(e) => error!("Failed to listen for interrupt: {}", e),
        }
        let _ = stop_tx.send(true);
    });
    spawn_reload(config_tx);

    let replay_path = settings.source.replay_path.as_deref().ok_or_else(|| {
        MonitorError::Source("no frame source configured (source.replay_path)".to_string())
    })?;
    let mut source = ReplaySource::open(replay_path, settings.source.realtime).await?;

    let transport = ChatLinkTransport::new(settings.messaging.open_command.clone());
    let (sos_tx, receipts, dispatcher) = spawn_dispatcher(transport, SOS_QUEUE_DEPTH);

    let mut driver = FrameDriver::new(config_rx, stop_rx, history.clone(), LogAlarmSound::new())
        .with_messaging(sos_tx, receipts);
    if !settings.source.realtime {
        // Unpaced replay: wall time follows the recording from session start
        driver = driver.with_recorded_time(SystemClock.now_ms());
    }
    let summary = driver.run(&mut source).await;

    // Let queued SOS hand-offs finish
    drop(driver);
    if let Err(e) = dispatcher.await {
        warn!("SOS dispatcher ended abnormally: {}", e);
    }

    save_history(&settings, &history).await?;

    let summary = summary?;
    info!(
        "Session: {} frames, {} without face, {} alarms, {} SOS",
        summary.frames, summary.faceless_frames, summary.alarm_events, summary.sos_dispatches
    );
    for (event_type, count) in history.count_by_type()? {
        info!("  {}: {}", event_type, count);
    }

    Ok(())
}

async fn load_history(settings: &Settings) -> Result<HistoryRepository, MonitorError> {
    let max_events = settings.history.max_events;
    let Some(path) = settings.history.path.as_deref() else {
        return Ok(HistoryRepository::with_capacity(max_events));
    };

    match tokio::fs::read_to_string(path).await {
        Ok(json) => Ok(HistoryRepository::from_json(&json, max_events)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No saved history at {}", path.display());
            Ok(HistoryRepository::with_capacity(max_events))
        }
        Err(e) => Err(e.into()),
    }
}

async fn save_history(
    settings: &Settings,
    history: &HistoryRepository,
) -> Result<(), MonitorError> {
    let Some(path) = settings.history.path.as_deref() else {
        return Ok(());
    };
    tokio::fs::write(path, history.to_json()?).await?;
    info!("Saved {} history events to {}", history.len(), path.display());
    Ok(())
}

/// Reload detection and emergency settings on SIGHUP
#[cfg(unix)]
fn spawn_reload(config_tx: watch::Sender<dms::EngineConfig>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangups = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Settings reload unavailable: {}", e);
                return;
            }
        };
        while hangups.recv().await.is_some() {
            match Settings::load() {
                Ok(settings) => {
                    info!("Settings reloaded");
                    config_tx.send_replace(settings.engine_config());
                }
                Err(e) => warn!("Settings reload rejected: {}", e),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload(_config_tx: watch::Sender<dms::EngineConfig>) {}
