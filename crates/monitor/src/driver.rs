//! Frame driver loop

use std::sync::Arc;

use alerting::{AlertError, SosPayload};
use dms::{
    AlarmMessage, DetectionEngine, DetectionState, EngineConfig, FrameClock, ManualClock,
    SosNotification, SoundCommand, SystemClock, WallClock,
};
use storage::{EventType, HistorySink};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::outputs::{AlarmSound, DispatchReceipt};
use crate::source::{FrameObservation, FrameSource};
use crate::MonitorError;

/// What the presentation layer shows after each frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    /// Frames processed so far
    pub frame: u64,
    pub state: DetectionState,
    /// Displayed alert; kept across frames without a face
    pub message: Option<AlarmMessage>,
    pub notification: SosNotification,
}

/// Counters returned when the loop ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverSummary {
    pub frames: u64,
    pub faceless_frames: u64,
    pub alarm_events: u64,
    pub sos_dispatches: u64,
    /// SOS requests that never reached the messaging task
    pub sos_dropped: u64,
}

/// Runs the detection engine once per frame and fans its outcome out
pub struct FrameDriver<H, A> {
    engine: DetectionEngine,
    frame_clock: FrameClock,
    wall_clock: Arc<dyn WallClock>,
    /// Set from `epoch + frame_time_ms` each frame when replaying unpaced
    recorded_clock: Option<(Arc<ManualClock>, i64)>,
    config_rx: watch::Receiver<EngineConfig>,
    stop_rx: watch::Receiver<bool>,
    history: H,
    sound: A,
    sos_tx: Option<mpsc::Sender<SosPayload>>,
    receipts_rx: Option<mpsc::UnboundedReceiver<DispatchReceipt>>,
    report_tx: watch::Sender<FrameReport>,
    message: Option<AlarmMessage>,
    summary: DriverSummary,
}

impl<H: HistorySink, A: AlarmSound> FrameDriver<H, A> {
    pub fn new(
        config_rx: watch::Receiver<EngineConfig>,
        stop_rx: watch::Receiver<bool>,
        history: H,
        sound: A,
    ) -> Self {
        let (report_tx, _) = watch::channel(FrameReport::default());
        Self {
            engine: DetectionEngine::new(),
            frame_clock: FrameClock::new(),
            wall_clock: Arc::new(SystemClock),
            recorded_clock: None,
            config_rx,
            stop_rx,
            history,
            sound,
            sos_tx: None,
            receipts_rx: None,
            report_tx,
            message: None,
            summary: DriverSummary::default(),
        }
    }

    pub fn with_wall_clock(mut self, clock: Arc<dyn WallClock>) -> Self {
        self.wall_clock = clock;
        self.recorded_clock = None;
        self
    }

    /// Take wall time from the frames themselves, offset by `epoch_ms`.
    ///
    /// Rolling windows, the SOS cooldown and event times then follow the
    /// recording even when it is replayed faster than real time.
    pub fn with_recorded_time(mut self, epoch_ms: i64) -> Self {
        let clock = Arc::new(ManualClock::new(epoch_ms));
        self.wall_clock = clock.clone();
        self.recorded_clock = Some((clock, epoch_ms));
        self
    }

    /// Attach the messaging task (see `spawn_dispatcher`)
    pub fn with_messaging(
        mut self,
        sos_tx: mpsc::Sender<SosPayload>,
        receipts_rx: mpsc::UnboundedReceiver<DispatchReceipt>,
    ) -> Self {
        self.sos_tx = Some(sos_tx);
        self.receipts_rx = Some(receipts_rx);
        self
    }

    /// Receiver of per-frame reports
    pub fn subscribe(&self) -> watch::Receiver<FrameReport> {
        self.report_tx.subscribe()
    }

    pub fn summary(&self) -> &DriverSummary {
        &self.summary
    }

    pub fn engine(&self) -> &DetectionEngine {
        &self.engine
    }

    /// Run until the source is exhausted or a stop is requested.
    ///
    /// The source is closed and the alarm silenced on every exit path.
    pub async fn run<S: FrameSource>(
        &mut self,
        source: &mut S,
    ) -> Result<DriverSummary, MonitorError> {
        info!("Starting frame driver");
        let mut stop_rx = self.stop_rx.clone();

        let result = loop {
            if *stop_rx.borrow() {
                info!("Stop requested");
                break Ok(());
            }

            let next = tokio::select! {
                biased;
                _ = stop_requested(&mut stop_rx) => None,
                frame = source.next_frame() => Some(frame),
            };

            match next {
                None => {
                    info!("Stop requested");
                    break Ok(());
                }
                Some(Ok(Some(observation))) => {
                    self.step(&observation);
                }
                Some(Ok(None)) => {
                    info!("Frame source exhausted");
                    break Ok(());
                }
                Some(Err(e)) => break Err(e),
            }
        };

        source.close();
        self.sound.deactivate();
        info!(
            "Frame driver stopped after {} frames ({} alarms, {} SOS)",
            self.summary.frames, self.summary.alarm_events, self.summary.sos_dispatches
        );

        result.map(|_| self.summary.clone())
    }

    /// Process one observation and publish its report
    pub fn step(&mut self, observation: &FrameObservation) -> FrameReport {
        let config = self.config_rx.borrow().clone();
        self.apply_receipts();

        let dt = self.frame_clock.advance(observation.frame_time_ms);
        if let Some((clock, epoch_ms)) = &self.recorded_clock {
            clock.set(epoch_ms + observation.frame_time_ms.round() as i64);
        }
        let now = self.wall_clock.now_ms();
        let outcome = self.engine.process(&observation.input, &config, dt, now);

        self.summary.frames += 1;
        metrics::counter!("sentinel_frames_total").increment(1);
        if !outcome.state.face_detected {
            self.summary.faceless_frames += 1;
            metrics::counter!("sentinel_faceless_frames_total").increment(1);
        }

        for event in outcome.events {
            if event.event_type != EventType::Sos {
                self.summary.alarm_events += 1;
                metrics::counter!("sentinel_alarm_edges_total", "type" => event.event_type.as_str())
                    .increment(1);
            }
            if let Err(e) = self.history.append_event(event) {
                warn!("History append failed: {}", e);
            }
        }

        if let Some(directive) = outcome.directive {
            match directive.sound {
                SoundCommand::Activate => self.sound.activate(),
                SoundCommand::Deactivate => self.sound.deactivate(),
            }
            self.message = directive.message;
        }

        if let Some(payload) = outcome.sos {
            self.summary.sos_dispatches += 1;
            metrics::counter!("sentinel_sos_dispatch_total").increment(1);
            self.forward_sos(payload);
        }

        let report = FrameReport {
            frame: self.summary.frames,
            state: outcome.state,
            message: self.message,
            notification: outcome.notification,
        };
        self.report_tx.send_replace(report.clone());
        report
    }

    /// Forget the current driver (driver change); SOS cooldown is kept
    pub fn reset_driver(&mut self) {
        info!("Resetting driver state");
        self.engine.reset_state();
        self.frame_clock.reset();
        self.message = None;
        self.sound.deactivate();
    }

    fn apply_receipts(&mut self) {
        let Some(receipts) = self.receipts_rx.as_mut() else {
            return;
        };
        while let Ok(receipt) = receipts.try_recv() {
            debug!("SOS from {} handed off as {}", receipt.requested_at_ms, receipt.handle);
            self.engine.confirm_sos();
        }
    }

    fn forward_sos(&mut self, payload: SosPayload) {
        let Some(tx) = self.sos_tx.as_ref() else {
            warn!("No messaging channel; SOS at {} not sent", payload.requested_at_ms);
            self.summary.sos_dropped += 1;
            return;
        };

        match tx.try_send(payload) {
            Ok(()) => {}
            Err(TrySendError::Full(payload)) => {
                warn!("SOS queue full; dropping request at {}", payload.requested_at_ms);
                self.summary.sos_dropped += 1;
            }
            Err(TrySendError::Closed(_)) => {
                warn!("{}", AlertError::ChannelClosed);
                self.summary.sos_dropped += 1;
            }
        }
    }
}

/// Resolves once stop is set; never resolves if the stop sender is gone
async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outputs::tests::RecordingTransport;
    use crate::outputs::{spawn_dispatcher, LogAlarmSound};
    use crate::source::ChannelSource;
    use dms::{FaceObservation, FrameInput, Landmark, ManualClock};
    use storage::HistoryRepository;

    const START_MS: i64 = 1_700_000_000_000;

    /// Face-mesh sized landmark set with the given eye opening (EAR)
    fn face(ear: f64) -> FaceObservation {
        let mut landmarks = vec![Landmark::default(); 478];
        let eyes = [
            ([362, 385, 387, 263, 373, 380], 0.65),
            ([33, 160, 158, 133, 153, 144], 0.35),
        ];
        for (eye, cx) in eyes {
            let half = ear * 0.05;
            landmarks[eye[0]] = Landmark::new(cx - 0.05, 0.4, 0.0);
            landmarks[eye[3]] = Landmark::new(cx + 0.05, 0.4, 0.0);
            landmarks[eye[1]] = Landmark::new(cx - 0.02, 0.4 - half, 0.0);
            landmarks[eye[2]] = Landmark::new(cx + 0.02, 0.4 - half, 0.0);
            landmarks[eye[5]] = Landmark::new(cx - 0.02, 0.4 + half, 0.0);
            landmarks[eye[4]] = Landmark::new(cx + 0.02, 0.4 + half, 0.0);
        }
        landmarks[78] = Landmark::new(0.4, 0.7, 0.0);
        landmarks[308] = Landmark::new(0.6, 0.7, 0.0);
        landmarks[13] = Landmark::new(0.5, 0.7, 0.0);
        landmarks[14] = Landmark::new(0.5, 0.7, 0.0);
        FaceObservation {
            landmarks,
            transform: None,
        }
    }

    fn observation(index: u64, ear: Option<f64>) -> FrameObservation {
        FrameObservation {
            frame_time_ms: index as f64 * 200.0,
            input: FrameInput {
                face: ear.map(face),
                seatbelt_off: false,
            },
        }
    }

    struct Harness {
        config_tx: watch::Sender<EngineConfig>,
        stop_tx: watch::Sender<bool>,
        history: Arc<HistoryRepository>,
        sound: Arc<LogAlarmSound>,
        driver: FrameDriver<Arc<HistoryRepository>, Arc<LogAlarmSound>>,
    }

    fn harness(config: EngineConfig) -> Harness {
        let (config_tx, config_rx) = watch::channel(config);
        let (stop_tx, stop_rx) = watch::channel(false);
        let history = Arc::new(HistoryRepository::new());
        let sound = Arc::new(LogAlarmSound::new());
        let driver = FrameDriver::new(config_rx, stop_rx, history.clone(), sound.clone())
            .with_wall_clock(Arc::new(ManualClock::new(START_MS)));
        Harness {
            config_tx,
            stop_tx,
            history,
            sound,
            driver,
        }
    }

    fn sos_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.emergency.enabled = true;
        config.emergency.contact_number = "+44 20 7946 0000".to_string();
        config
    }

    #[tokio::test]
    async fn test_drowsy_replay_logs_one_event() {
        let mut h = harness(EngineConfig::default());
        let mut reports = h.driver.subscribe();
        let (tx, mut source) = ChannelSource::channel(32);
        for i in 0..12 {
            tx.send(observation(i, Some(0.1))).await.unwrap();
        }
        drop(tx);

        let summary = h.driver.run(&mut source).await.unwrap();

        assert_eq!(summary.frames, 12);
        assert_eq!(summary.alarm_events, 1);
        let events = h.history.events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Drowsy);
        assert_eq!(events[0].timestamp, START_MS);

        let last = reports.borrow_and_update().clone();
        assert_eq!(last.frame, 12);
        assert!(last.state.is_drowsy);
        assert_eq!(last.message, Some(AlarmMessage::EyesClosed));
        // Silenced on exit
        assert!(!h.sound.is_active());
    }

    #[tokio::test]
    async fn test_unpaced_replay_rates_follow_recording() {
        let h = harness(EngineConfig::default());
        let mut driver = h.driver.with_recorded_time(START_MS);
        let mut reports = driver.subscribe();

        // Five minutes at one frame per second, a blink every other frame
        let (tx, mut source) = ChannelSource::channel(300);
        for i in 0..300u64 {
            let ear = if i % 2 == 0 { 0.1 } else { 0.3 };
            let frame = FrameObservation {
                frame_time_ms: i as f64 * 1000.0,
                input: FrameInput {
                    face: Some(face(ear)),
                    seatbelt_off: false,
                },
            };
            tx.send(frame).await.unwrap();
        }
        drop(tx);

        let summary = driver.run(&mut source).await.unwrap();
        assert_eq!(summary.frames, 300);

        // Blinks at 240s..298s are inside the minute ending at 299s
        let last = reports.borrow_and_update().clone();
        assert_eq!(last.state.blink_rate, 30);
        assert_eq!(last.state.stress_level, 45);
        assert!(!last.state.is_drowsy);
    }

    #[tokio::test]
    async fn test_recorded_time_stamps_events() {
        let h = harness(EngineConfig::default());
        let mut driver = h.driver.with_recorded_time(START_MS);
        for i in 0..9 {
            driver.step(&observation(i, Some(0.1)));
        }

        let events = h.history.events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, START_MS + 1600);
    }

    #[tokio::test]
    async fn test_sound_follows_directive() {
        let mut h = harness(EngineConfig::default());
        for i in 0..9 {
            h.driver.step(&observation(i, Some(0.1)));
        }
        assert!(h.sound.is_active());

        h.driver.step(&observation(9, Some(0.3)));
        assert!(!h.sound.is_active());
    }

    #[tokio::test]
    async fn test_faceless_frames_keep_message_and_sound() {
        let mut h = harness(EngineConfig::default());
        for i in 0..9 {
            h.driver.step(&observation(i, Some(0.1)));
        }

        let report = h.driver.step(&observation(9, None));
        assert!(!report.state.face_detected);
        assert!(report.state.is_drowsy);
        assert_eq!(report.message, Some(AlarmMessage::EyesClosed));
        assert!(h.sound.is_active());
        assert_eq!(h.driver.summary().faceless_frames, 1);
    }

    #[tokio::test]
    async fn test_config_snapshot_taken_each_frame() {
        let mut h = harness(EngineConfig::default());
        for i in 0..5 {
            h.driver.step(&observation(i, Some(0.1)));
        }
        assert!(!h.driver.engine().state().is_drowsy);

        // 1.0s accumulated after the next frame, past the new 0.5s trigger
        let mut faster = EngineConfig::default();
        faster.detection.time_to_trigger = 0.5;
        h.config_tx.send(faster).unwrap();

        let report = h.driver.step(&observation(5, Some(0.1)));
        assert!(report.state.is_drowsy);
    }

    #[tokio::test]
    async fn test_sos_reaches_transport_and_confirms() {
        let h = harness(sos_config());
        let transport = RecordingTransport::default();
        let sent = transport.sent.clone();
        let (sos_tx, receipts, dispatcher) = spawn_dispatcher(transport, 4);
        let mut driver = h.driver.with_messaging(sos_tx, receipts);

        // Drowsy alarm after 9 frames, then just over 5s of critical time
        let mut index = 0;
        while driver.summary().sos_dispatches == 0 && index < 60 {
            driver.step(&observation(index, Some(0.1)));
            index += 1;
        }
        assert_eq!(driver.summary().sos_dispatches, 1);
        assert!(driver.engine().state().is_drowsy);

        for _ in 0..100 {
            if !sent.lock().unwrap().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let (destination, text) = sent.lock().unwrap()[0].clone();
        assert_eq!(destination, "442079460000");
        assert!(text.starts_with("EMERGENCY: Driver is unresponsive/drowsy."));

        for _ in 0..100 {
            let report = driver.step(&observation(index, Some(0.1)));
            index += 1;
            if matches!(report.notification, SosNotification::Sent { .. }) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(
            driver.subscribe().borrow().notification,
            SosNotification::Sent { since_ms: START_MS }
        );

        let history = h.history.count_by_type().unwrap();
        assert_eq!(history.get(&EventType::Sos), Some(&1));

        drop(driver);
        dispatcher.await.unwrap();
    }

    #[tokio::test]
    async fn test_sos_without_messaging_is_dropped() {
        let mut h = harness(sos_config());
        for i in 0..60 {
            h.driver.step(&observation(i, Some(0.1)));
        }
        assert_eq!(h.driver.summary().sos_dispatches, 1);
        assert_eq!(h.driver.summary().sos_dropped, 1);
    }

    #[tokio::test]
    async fn test_stop_before_start_processes_nothing() {
        let mut h = harness(EngineConfig::default());
        let (tx, mut source) = ChannelSource::channel(4);
        tx.send(observation(0, Some(0.3))).await.unwrap();

        h.stop_tx.send(true).unwrap();
        let summary = h.driver.run(&mut source).await.unwrap();
        assert_eq!(summary.frames, 0);
    }

    #[tokio::test]
    async fn test_stop_while_waiting_for_frames() {
        let mut h = harness(EngineConfig::default());
        let mut reports = h.driver.subscribe();
        let (tx, mut source) = ChannelSource::channel(4);
        let stop_tx = h.stop_tx;

        let producer = async {
            for i in 0..3 {
                tx.send(observation(i, Some(0.3))).await.unwrap();
            }
            reports.wait_for(|r| r.frame == 3).await.unwrap();
            stop_tx.send(true).unwrap();
        };

        // The producer keeps its sender, so only the stop ends the loop
        let (result, _) = tokio::join!(h.driver.run(&mut source), producer);
        assert_eq!(result.unwrap().frames, 3);
        assert!(tx.send(observation(3, Some(0.3))).await.is_err());
    }

    #[tokio::test]
    async fn test_reset_driver_clears_alarms() {
        let mut h = harness(EngineConfig::default());
        for i in 0..9 {
            h.driver.step(&observation(i, Some(0.1)));
        }
        assert!(h.sound.is_active());

        h.driver.reset_driver();
        assert!(!h.sound.is_active());
        assert!(!h.driver.engine().state().is_drowsy);
        assert_eq!(h.driver.engine().condition_elapsed(dms::Condition::Drowsy), 0.0);
    }
}
