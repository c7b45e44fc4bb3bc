//! Body landmarks as produced by the external pose engine.
//!
//! The engine reports 33 landmarks per frame in a fixed schema; only the
//! limb landmarks named in [`index`] are consumed by the risk pipeline.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

/// Number of landmarks in every frame of the engine's schema.
pub const LANDMARK_COUNT: usize = 33;

/// Minimum number of [`FULL_BODY_LANDMARKS`] that must be confidently
/// tracked for a frame to count as a full-body view.
pub const FULL_BODY_MIN_VISIBLE: usize = 6;

/// Landmark indices in the engine's schema.
pub mod index {
    pub const NOSE: usize = 0;
    pub const LEFT_SHOULDER: usize = 11;
    pub const RIGHT_SHOULDER: usize = 12;
    pub const LEFT_ELBOW: usize = 13;
    pub const RIGHT_ELBOW: usize = 14;
    pub const LEFT_WRIST: usize = 15;
    pub const RIGHT_WRIST: usize = 16;
    pub const LEFT_HIP: usize = 23;
    pub const RIGHT_HIP: usize = 24;
    pub const LEFT_KNEE: usize = 25;
    pub const RIGHT_KNEE: usize = 26;
    pub const LEFT_ANKLE: usize = 27;
    pub const RIGHT_ANKLE: usize = 28;
}

/// Landmarks checked by [`PoseFrame::is_full_body_visible`].
pub const FULL_BODY_LANDMARKS: [usize; 8] = [
    index::LEFT_SHOULDER,
    index::RIGHT_SHOULDER,
    index::LEFT_HIP,
    index::RIGHT_HIP,
    index::LEFT_KNEE,
    index::RIGHT_KNEE,
    index::LEFT_ANKLE,
    index::RIGHT_ANKLE,
];

/// A single tracked body point in normalised image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    /// Depth relative to the hips. Ignored by the angle math.
    #[serde(default)]
    pub z: f64,
    /// Engine confidence in `[0, 1]`.
    pub visibility: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, visibility: f64) -> Self {
        Self {
            x,
            y,
            z: 0.0,
            visibility,
        }
    }

    /// Whether the landmark is confident enough to take part in a
    /// measurement.
    pub fn is_confident(&self, threshold: f64) -> bool {
        self.visibility >= threshold
    }

    /// Whether both image-plane coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// One frame's worth of landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseFrame {
    pub landmarks: Vec<Landmark>,
    pub captured_at: Timestamp,
}

impl PoseFrame {
    pub fn new(landmarks: Vec<Landmark>, captured_at: Timestamp) -> Self {
        Self {
            landmarks,
            captured_at,
        }
    }

    /// Landmark at `idx`, if the engine reported one.
    pub fn get(&self, idx: usize) -> Option<&Landmark> {
        self.landmarks.get(idx)
    }

    /// Reject frames that do not follow the engine's 33-landmark schema.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.landmarks.len() < LANDMARK_COUNT {
            return Err(CoreError::MalformedFrame(format!(
                "expected {LANDMARK_COUNT} landmarks, got {}",
                self.landmarks.len()
            )));
        }
        Ok(())
    }

    /// Whether enough of the shoulder/hip/knee/ankle landmarks are tracked
    /// for the subject to be fully in view.
    ///
    /// Stricter than angle gating: a landmark must be strictly above
    /// `threshold` to count.
    pub fn is_full_body_visible(&self, threshold: f64) -> bool {
        FULL_BODY_LANDMARKS
            .iter()
            .filter_map(|&idx| self.get(idx))
            .filter(|lm| lm.visibility > threshold)
            .count()
            >= FULL_BODY_MIN_VISIBLE
    }
}
