//! Joint angle geometry.
//!
//! Angles are measured in the image plane (depth is ignored). Two variants
//! exist: [`interior_angle`] is the confidence-gated measurement used for
//! risk classification, [`oriented_angle`] is the overlay variant drawn
//! next to each joint on the live view.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::landmark::{index, Landmark, PoseFrame};
use crate::risk::JointKind;

/// Landmarks below this visibility are not measured.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

// ---------------------------------------------------------------------------
// Angle primitives
// ---------------------------------------------------------------------------

/// Interior angle at vertex `b` formed by the rays `b→a` and `b→c`, in
/// degrees within `[0, 180]`.
///
/// Returns `None` when any landmark is below `confidence_threshold`, has
/// non-finite coordinates, or when either ray has zero length.
pub fn interior_angle(
    a: &Landmark,
    b: &Landmark,
    c: &Landmark,
    confidence_threshold: f64,
) -> Option<f64> {
    if [a, b, c]
        .iter()
        .any(|lm| !lm.is_confident(confidence_threshold) || !lm.is_finite())
    {
        return None;
    }

    let (v1x, v1y) = (a.x - b.x, a.y - b.y);
    let (v2x, v2y) = (c.x - b.x, c.y - b.y);

    let mag1 = v1x.hypot(v1y);
    let mag2 = v2x.hypot(v2y);
    if mag1 == 0.0 || mag2 == 0.0 {
        return None;
    }

    // Clamp guards acos against rounding just outside [-1, 1].
    let cos = ((v1x * v2x + v1y * v2y) / (mag1 * mag2)).clamp(-1.0, 1.0);
    Some(cos.acos().to_degrees())
}

/// Overlay angle at `b`: the absolute `atan2` difference between the two
/// rays, folded into `[0, 180]`.
///
/// No confidence gating is applied; the overlay draws whatever the engine
/// reported.
pub fn oriented_angle(a: &Landmark, b: &Landmark, c: &Landmark) -> f64 {
    let radians = (c.y - b.y).atan2(c.x - b.x) - (a.y - b.y).atan2(a.x - b.x);
    let angle = radians.to_degrees().abs();
    if angle > 180.0 {
        360.0 - angle
    } else {
        angle
    }
}

/// Combine the left and right measurement of one joint.
///
/// Both present: mean. One present: that side unmodified. Neither: `None`.
pub fn combine_sides(left: Option<f64>, right: Option<f64>) -> Option<f64> {
    match (left, right) {
        (Some(l), Some(r)) => Some((l + r) / 2.0),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}

// ---------------------------------------------------------------------------
// Joint triples
// ---------------------------------------------------------------------------

/// Body side of a limb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

/// The `(a, vertex, c)` landmark indices measured for a joint on one side.
pub fn joint_triple(joint: JointKind, side: Side) -> (usize, usize, usize) {
    use index::*;
    match (joint, side) {
        (JointKind::Shoulder, Side::Left) => (LEFT_ELBOW, LEFT_SHOULDER, LEFT_HIP),
        (JointKind::Shoulder, Side::Right) => (RIGHT_ELBOW, RIGHT_SHOULDER, RIGHT_HIP),
        (JointKind::Elbow, Side::Left) => (LEFT_SHOULDER, LEFT_ELBOW, LEFT_WRIST),
        (JointKind::Elbow, Side::Right) => (RIGHT_SHOULDER, RIGHT_ELBOW, RIGHT_WRIST),
        (JointKind::Hip, Side::Left) => (LEFT_SHOULDER, LEFT_HIP, LEFT_KNEE),
        (JointKind::Hip, Side::Right) => (RIGHT_SHOULDER, RIGHT_HIP, RIGHT_KNEE),
        (JointKind::Knee, Side::Left) => (LEFT_HIP, LEFT_KNEE, LEFT_ANKLE),
        (JointKind::Knee, Side::Right) => (RIGHT_HIP, RIGHT_KNEE, RIGHT_ANKLE),
    }
}

// ---------------------------------------------------------------------------
// Angle sets
// ---------------------------------------------------------------------------

/// Left/right measurement of one joint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BilateralAngle {
    pub left: Option<f64>,
    pub right: Option<f64>,
}

impl BilateralAngle {
    pub fn combined(&self) -> Option<f64> {
        combine_sides(self.left, self.right)
    }
}

/// Per-side angles of every measured joint in a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LimbAngles {
    pub shoulder: BilateralAngle,
    pub elbow: BilateralAngle,
    pub hip: BilateralAngle,
    pub knee: BilateralAngle,
}

impl LimbAngles {
    pub fn joint(&self, joint: JointKind) -> &BilateralAngle {
        match joint {
            JointKind::Shoulder => &self.shoulder,
            JointKind::Elbow => &self.elbow,
            JointKind::Hip => &self.hip,
            JointKind::Knee => &self.knee,
        }
    }

    /// Collapse both sides into one angle per joint.
    pub fn combined(&self) -> JointAngleSet {
        JointAngleSet {
            shoulder_rotation: self.shoulder.combined(),
            elbow_bend: self.elbow.combined(),
            hip_rotation: self.hip.combined(),
            knee_angle: self.knee.combined(),
        }
    }
}

/// One angle per joint type, in degrees. Absent joints were not measurable
/// in the frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JointAngleSet {
    pub shoulder_rotation: Option<f64>,
    pub elbow_bend: Option<f64>,
    pub hip_rotation: Option<f64>,
    pub knee_angle: Option<f64>,
}

impl JointAngleSet {
    pub fn get(&self, joint: JointKind) -> Option<f64> {
        match joint {
            JointKind::Shoulder => self.shoulder_rotation,
            JointKind::Elbow => self.elbow_bend,
            JointKind::Hip => self.hip_rotation,
            JointKind::Knee => self.knee_angle,
        }
    }

    /// Whether at least one joint was measured.
    pub fn has_any(&self) -> bool {
        JointKind::ALL.iter().any(|&j| self.get(j).is_some())
    }
}

// ---------------------------------------------------------------------------
// AngleExtractor
// ---------------------------------------------------------------------------

/// Turns landmark frames into joint angles.
#[derive(Debug, Clone, Copy)]
pub struct AngleExtractor {
    confidence_threshold: f64,
}

impl Default for AngleExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

impl AngleExtractor {
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
        }
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /// Measure every joint on both sides.
    ///
    /// Fails only for frames that break the landmark schema; unmeasurable
    /// joints are reported as `None`.
    pub fn extract(&self, frame: &PoseFrame) -> Result<LimbAngles, CoreError> {
        frame.validate()?;

        let measure = |joint, side| {
            let (a, b, c) = joint_triple(joint, side);
            interior_angle(
                &frame.landmarks[a],
                &frame.landmarks[b],
                &frame.landmarks[c],
                self.confidence_threshold,
            )
        };
        let bilateral = |joint| BilateralAngle {
            left: measure(joint, Side::Left),
            right: measure(joint, Side::Right),
        };

        Ok(LimbAngles {
            shoulder: bilateral(JointKind::Shoulder),
            elbow: bilateral(JointKind::Elbow),
            hip: bilateral(JointKind::Hip),
            knee: bilateral(JointKind::Knee),
        })
    }

    /// Overlay angles for every joint on both sides, without gating.
    pub fn overlay(&self, frame: &PoseFrame) -> Result<Vec<(JointKind, Side, f64)>, CoreError> {
        frame.validate()?;
        let mut out = Vec::with_capacity(JointKind::ALL.len() * 2);
        for joint in JointKind::ALL {
            for side in [Side::Left, Side::Right] {
                let (a, b, c) = joint_triple(joint, side);
                out.push((
                    joint,
                    side,
                    oriented_angle(
                        &frame.landmarks[a],
                        &frame.landmarks[b],
                        &frame.landmarks[c],
                    ),
                ));
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
