//! File-backed input for the pipeline.
//!
//! A recording is a JSON-lines file. The first line is a [`ReplayHeader`]
//! describing the original video; each following line is one
//! [`RecordedFrame`] holding the landmarks the pose engine produced for it
//! (or `null` when nobody was in frame).
//!
//! ```text
//! {"width":1280,"height":720,"fps":30}
//! {"landmarks":[{"x":0.51,"y":0.22,"visibility":0.98}, ...]}
//! {"landmarks":null}
//! ```
//!
//! [`ReplayCaptureProvider`] turns a recording into a [`FrameSource`] and
//! [`PassthroughEngine`] answers detection requests from the same recording.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smashguard_core::landmark::Landmark;
use smashguard_pipeline::{
    AcquisitionError, CaptureProvider, EngineConfig, EngineError, FrameSource, InputRequest,
    PoseEngine, RawFrame,
};

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplayHeader {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub landmarks: Option<Vec<Landmark>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Recording is empty")]
    MissingHeader,

    #[error("Line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct Recording {
    pub header: ReplayHeader,
    pub frames: Vec<RecordedFrame>,
}

impl Recording {
    /// Parse a JSON-lines recording. Blank lines are ignored.
    pub fn parse(text: &str) -> Result<Self, ReplayError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty());

        let (line, first) = lines.next().ok_or(ReplayError::MissingHeader)?;
        let header: ReplayHeader =
            serde_json::from_str(first).map_err(|source| ReplayError::Parse { line, source })?;

        let frames = lines
            .map(|(line, text)| {
                serde_json::from_str(text).map_err(|source| ReplayError::Parse { line, source })
            })
            .collect::<Result<Vec<RecordedFrame>, _>>()?;

        Ok(Self { header, frames })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Interval between frames at the recorded rate.
    pub fn frame_interval(&self) -> Option<Duration> {
        (self.header.fps.is_finite() && self.header.fps > 0.0)
            .then(|| Duration::from_secs_f64(1.0 / self.header.fps))
    }
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

/// Serves a recording as video input.
pub struct ReplayCaptureProvider {
    recording: Arc<Recording>,
    realtime: bool,
    released: Arc<AtomicUsize>,
}

impl ReplayCaptureProvider {
    /// With `realtime`, frames are delivered at the recorded frame rate;
    /// otherwise as fast as the pipeline consumes them.
    pub fn new(recording: Arc<Recording>, realtime: bool) -> Self {
        Self {
            recording,
            realtime,
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of sources opened by this provider that have been released.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureProvider for ReplayCaptureProvider {
    async fn open(&self, request: &InputRequest) -> Result<Box<dyn FrameSource>, AcquisitionError> {
        if matches!(request, InputRequest::Camera(_)) {
            return Err(AcquisitionError::CameraUnavailable(
                "replay agent has no camera".into(),
            ));
        }
        if self.recording.is_empty() {
            return Err(AcquisitionError::Corrupt("recording has no frames".into()));
        }

        let interval = if self.realtime {
            self.recording.frame_interval()
        } else {
            None
        };
        Ok(Box::new(ReplaySource {
            recording: Arc::clone(&self.recording),
            next: 0,
            interval,
            released: Arc::clone(&self.released),
        }))
    }
}

pub struct ReplaySource {
    recording: Arc<Recording>,
    next: usize,
    interval: Option<Duration>,
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl FrameSource for ReplaySource {
    fn dimensions(&self) -> (u32, u32) {
        (self.recording.header.width, self.recording.header.height)
    }

    async fn next_frame(&mut self) -> Option<RawFrame> {
        if self.next >= self.recording.len() {
            return None;
        }
        if let Some(interval) = self.interval {
            if self.next > 0 {
                tokio::time::sleep(interval).await;
            }
        }
        let sequence = self.next as u64;
        self.next += 1;
        Some(RawFrame {
            sequence,
            width: self.recording.header.width,
            height: self.recording.header.height,
            captured_at: chrono::Utc::now(),
            pixels: Arc::from(Vec::<u8>::new()),
        })
    }

    async fn release(&mut self) {
        self.next = self.recording.len();
        self.released.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Replay source released");
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Answers detection requests with the landmarks stored in the recording.
pub struct PassthroughEngine {
    recording: Arc<Recording>,
}

impl PassthroughEngine {
    pub fn new(recording: Arc<Recording>) -> Self {
        Self { recording }
    }
}

#[async_trait]
impl PoseEngine for PassthroughEngine {
    async fn initialize(&mut self, config: &EngineConfig) -> Result<(), EngineError> {
        tracing::debug!(?config, frames = self.recording.len(), "Passthrough engine ready");
        Ok(())
    }

    async fn detect(&mut self, frame: &RawFrame) -> Result<Option<Vec<Landmark>>, EngineError> {
        let recorded = self
            .recording
            .frames
            .get(frame.sequence as usize)
            .ok_or_else(|| EngineError(format!("no recorded frame {}", frame.sequence)))?;
        Ok(recorded.landmarks.clone())
    }
}
