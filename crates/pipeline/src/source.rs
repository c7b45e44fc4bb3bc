//! Seams to the external collaborators of the pipeline.
//!
//! The pose engine, the capture/decoding layer and the rendering surface
//! live outside this crate. The controller only talks to them through the
//! traits below, which makes every suspension point mockable.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smashguard_core::angle::Side;
use smashguard_core::landmark::Landmark;
use smashguard_core::risk::{ClassifiedSnapshot, JointKind, RiskTier};
use smashguard_core::types::{InputMode, SessionId, Timestamp};

use crate::error::{AcquisitionError, EngineError};

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// A decoded image handed from the frame source to the pose engine.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Position of the frame within its source, starting at 0.
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub captured_at: Timestamp,
    /// Opaque pixel data; only the pose engine interprets it.
    pub pixels: Arc<[u8]>,
}

/// What the render surface draws for one processed frame.
#[derive(Debug, Clone)]
pub struct OverlayFrame {
    pub sequence: u64,
    pub landmarks: Vec<Landmark>,
    pub angles: Vec<OverlayAngle>,
    pub overall_risk: Option<RiskTier>,
}

/// One joint label on the overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayAngle {
    pub joint: JointKind,
    pub side: Side,
    pub degrees: f64,
}

/// Per-frame update delivered to subscribed observers.
#[derive(Debug, Clone)]
pub struct FrameUpdate {
    pub session_id: SessionId,
    pub metrics: ClassifiedSnapshot,
    pub overall_risk: Option<RiskTier>,
    pub full_body_detected: bool,
}

// ---------------------------------------------------------------------------
// Pose engine
// ---------------------------------------------------------------------------

/// Settings passed to the pose engine once, before its first frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub model_complexity: u8,
    pub smooth_landmarks: bool,
    pub enable_segmentation: bool,
    pub min_detection_confidence: f64,
    pub min_tracking_confidence: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_complexity: 1,
            smooth_landmarks: true,
            enable_segmentation: false,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
        }
    }
}

#[async_trait]
pub trait PoseEngine: Send {
    async fn initialize(&mut self, config: &EngineConfig) -> Result<(), EngineError>;

    /// Detect the subject's landmarks, `None` when nobody is in frame.
    async fn detect(&mut self, frame: &RawFrame) -> Result<Option<Vec<Landmark>>, EngineError>;
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

/// Requested capture resolution and rate for camera input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub ideal_fps: u32,
    pub max_fps: u32,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            ideal_width: 640,
            ideal_height: 480,
            max_width: 1280,
            max_height: 720,
            ideal_fps: 15,
            max_fps: 30,
        }
    }
}

/// What `start` should open.
#[derive(Debug, Clone, PartialEq)]
pub enum InputRequest {
    Camera(CameraConstraints),
    Video {
        content_type: String,
        size_bytes: u64,
        path: String,
    },
}

impl InputRequest {
    pub fn camera() -> Self {
        InputRequest::Camera(CameraConstraints::default())
    }

    pub fn video(path: impl Into<String>, content_type: impl Into<String>, size_bytes: u64) -> Self {
        InputRequest::Video {
            content_type: content_type.into(),
            size_bytes,
            path: path.into(),
        }
    }

    pub fn mode(&self) -> InputMode {
        match self {
            InputRequest::Camera(_) => InputMode::Camera,
            InputRequest::Video { .. } => InputMode::Video,
        }
    }
}

#[async_trait]
pub trait CaptureProvider: Send + Sync {
    async fn open(&self, request: &InputRequest) -> Result<Box<dyn FrameSource>, AcquisitionError>;
}

/// An opened camera stream or decoded video.
#[async_trait]
pub trait FrameSource: Send {
    /// Decoded `(width, height)`.
    fn dimensions(&self) -> (u32, u32);

    /// Next frame, or `None` at end of input.
    async fn next_frame(&mut self) -> Option<RawFrame>;

    /// Stop tracks / revoke the file handle.
    async fn release(&mut self);
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

pub trait RenderSurface: Send + Sync {
    fn draw_overlay(&self, frame: &OverlayFrame);
    fn clear(&self);
}

// ---------------------------------------------------------------------------
// Input validation
// ---------------------------------------------------------------------------

/// Check a video request before anything is opened.
pub fn validate_request(request: &InputRequest, max_video_bytes: u64) -> Result<(), AcquisitionError> {
    let InputRequest::Video {
        content_type,
        size_bytes,
        ..
    } = request
    else {
        return Ok(());
    };

    if !content_type.starts_with("video/") {
        return Err(AcquisitionError::UnsupportedFormat(content_type.clone()));
    }
    if *size_bytes > max_video_bytes {
        return Err(AcquisitionError::FileTooLarge {
            size_bytes: *size_bytes,
            limit_bytes: max_video_bytes,
        });
    }
    Ok(())
}

/// Check the decoded dimensions of an opened source.
pub fn validate_dimensions(
    mode: InputMode,
    (width, height): (u32, u32),
    min_video_dimension: u32,
) -> Result<(), AcquisitionError> {
    let min = match mode {
        InputMode::Camera => 1,
        InputMode::Video => min_video_dimension.max(1),
    };
    if width < min || height < min {
        return Err(AcquisitionError::InvalidDimensions { width, height });
    }
    Ok(())
}
