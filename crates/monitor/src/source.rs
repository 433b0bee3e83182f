//! Frame sources

use std::path::Path;
use std::time::Duration;

use dms::FrameInput;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::MonitorError;

/// One timestamped frame from the landmark producer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameObservation {
    /// Frame timestamp (milliseconds, producer clock)
    pub frame_time_ms: f64,
    #[serde(flatten)]
    pub input: FrameInput,
}

/// Producer of frames for the driver loop
#[allow(async_fn_in_trait)]
pub trait FrameSource {
    /// Next frame, or `None` once the source is exhausted
    async fn next_frame(&mut self) -> Result<Option<FrameObservation>, MonitorError>;

    /// Release the underlying producer
    fn close(&mut self) {}
}

/// Replays a JSON-lines recording, one observation per line
pub struct ReplaySource {
    lines: Option<Lines<BufReader<File>>>,
    line_no: usize,
    realtime: bool,
    last_frame_ms: Option<f64>,
}

impl ReplaySource {
    pub async fn open(path: &Path, realtime: bool) -> Result<Self, MonitorError> {
        let file = File::open(path).await?;
        info!("Replaying frames from {}", path.display());
        Ok(Self {
            lines: Some(BufReader::new(file).lines()),
            line_no: 0,
            realtime,
            last_frame_ms: None,
        })
    }

    /// Lines read so far, blank ones included
    pub fn line_no(&self) -> usize {
        self.line_no
    }

    async fn pace(&mut self, frame_time_ms: f64) {
        if let Some(last) = self.last_frame_ms {
            let gap = frame_time_ms - last;
            if self.realtime && gap.is_finite() && gap > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(gap / 1000.0)).await;
            }
        }
        self.last_frame_ms = Some(frame_time_ms);
    }
}

impl FrameSource for ReplaySource {
    async fn next_frame(&mut self) -> Result<Option<FrameObservation>, MonitorError> {
        loop {
            let Some(lines) = self.lines.as_mut() else {
                return Ok(None);
            };
            let Some(line) = lines.next_line().await? else {
                debug!("Replay exhausted after {} lines", self.line_no);
                return Ok(None);
            };
            self.line_no += 1;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let observation: FrameObservation = serde_json::from_str(line).map_err(|e| {
                MonitorError::Source(format!("line {}: {}", self.line_no, e))
            })?;
            self.pace(observation.frame_time_ms).await;
            return Ok(Some(observation));
        }
    }

    fn close(&mut self) {
        if self.lines.take().is_some() {
            info!("Replay closed at line {}", self.line_no);
        }
    }
}

/// Frames pushed by a live producer over a channel
pub struct ChannelSource {
    rx: mpsc::Receiver<FrameObservation>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<FrameObservation>) -> Self {
        Self { rx }
    }

    /// Create a source with its producer end
    pub fn channel(capacity: usize) -> (mpsc::Sender<FrameObservation>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }
}

impl FrameSource for ChannelSource {
    async fn next_frame(&mut self) -> Result<Option<FrameObservation>, MonitorError> {
        Ok(self.rx.recv().await)
    }

    fn close(&mut self) {
        self.rx.close();
    }
}
