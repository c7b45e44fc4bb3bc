//! Joint risk classification and aggregation.
//!
//! Each joint type has a fixed optimal band. An angle inside the band is
//! [`RiskTier::Safe`], an angle within the tolerance margin around the band
//! is [`RiskTier::MediumRisk`], anything further out is
//! [`RiskTier::HighRisk`]. The overall tier of a frame is its worst
//! measured joint.

use serde::{Deserialize, Serialize};

use crate::angle::JointAngleSet;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Margin around each safe band that still counts as medium risk.
pub const DEFAULT_TOLERANCE_DEG: f64 = 10.0;

/// Numeric scores per tier, used only for trend and summary statistics.
pub const SCORE_SAFE: f64 = 0.0;
pub const SCORE_MEDIUM_RISK: f64 = 50.0;
pub const SCORE_HIGH_RISK: f64 = 100.0;

/// Joint weights of the cosmetic weighted risk score.
pub const WEIGHT_SHOULDER: f64 = 0.3;
pub const WEIGHT_ELBOW: f64 = 0.2;
pub const WEIGHT_HIP: f64 = 0.2;
pub const WEIGHT_KNEE: f64 = 0.3;

// ---------------------------------------------------------------------------
// RiskTier
// ---------------------------------------------------------------------------

/// Injury-risk tier, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Safe,
    MediumRisk,
    HighRisk,
}

impl RiskTier {
    /// Numeric score: `Safe = 0`, `MediumRisk = 50`, `HighRisk = 100`.
    pub fn score(self) -> f64 {
        match self {
            RiskTier::Safe => SCORE_SAFE,
            RiskTier::MediumRisk => SCORE_MEDIUM_RISK,
            RiskTier::HighRisk => SCORE_HIGH_RISK,
        }
    }

    /// Ordinal rank (`0..=2`), used when comparing tiers over time.
    pub fn rank(self) -> i32 {
        match self {
            RiskTier::Safe => 0,
            RiskTier::MediumRisk => 1,
            RiskTier::HighRisk => 2,
        }
    }

    /// Human-readable label matching the dashboard.
    pub fn label(self) -> &'static str {
        match self {
            RiskTier::Safe => "Safe",
            RiskTier::MediumRisk => "Medium Risk",
            RiskTier::HighRisk => "High Risk",
        }
    }

    pub fn is_at_risk(self) -> bool {
        self >= RiskTier::MediumRisk
    }
}

// ---------------------------------------------------------------------------
// JointKind / SafeBand
// ---------------------------------------------------------------------------

/// Joint types measured by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointKind {
    Shoulder,
    Elbow,
    Hip,
    Knee,
}

impl JointKind {
    pub const ALL: [JointKind; 4] = [
        JointKind::Shoulder,
        JointKind::Elbow,
        JointKind::Hip,
        JointKind::Knee,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JointKind::Shoulder => "shoulder",
            JointKind::Elbow => "elbow",
            JointKind::Hip => "hip",
            JointKind::Knee => "knee",
        }
    }

    /// Optimal angle band for the joint.
    pub fn safe_band(self) -> SafeBand {
        match self {
            JointKind::Shoulder => SafeBand::new(90.0, 140.0),
            JointKind::Elbow => SafeBand::new(140.0, 170.0),
            JointKind::Hip => SafeBand::new(80.0, 120.0),
            JointKind::Knee => SafeBand::new(140.0, 165.0),
        }
    }

    pub fn weight(self) -> f64 {
        match self {
            JointKind::Shoulder => WEIGHT_SHOULDER,
            JointKind::Elbow => WEIGHT_ELBOW,
            JointKind::Hip => WEIGHT_HIP,
            JointKind::Knee => WEIGHT_KNEE,
        }
    }
}

impl std::fmt::Display for JointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive optimal angle range, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafeBand {
    pub min: f64,
    pub max: f64,
}

impl SafeBand {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, angle: f64) -> bool {
        (self.min..=self.max).contains(&angle)
    }

    /// Whether `angle` lies inside the band widened by `tolerance` on both
    /// ends.
    pub fn contains_with_tolerance(&self, angle: f64, tolerance: f64) -> bool {
        (self.min - tolerance..=self.max + tolerance).contains(&angle)
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify a joint angle with the default tolerance.
///
/// - `Safe`       -- inside the band (inclusive)
/// - `MediumRisk` -- within `band ± tolerance` (inclusive)
/// - `HighRisk`   -- beyond that
///
/// An absent angle displays as `Safe`; callers exclude it from
/// aggregation.
pub fn classify(joint: JointKind, angle: Option<f64>) -> RiskTier {
    RiskClassifier::default().classify(joint, angle)
}

/// Worst tier over the measured joints; `None` when nothing was measured.
pub fn aggregate_overall<I>(tiers: I) -> Option<RiskTier>
where
    I: IntoIterator<Item = (Option<f64>, RiskTier)>,
{
    tiers
        .into_iter()
        .filter_map(|(angle, tier)| angle.map(|_| tier))
        .max()
}

/// Threshold-table classifier with a configurable tolerance margin.
#[derive(Debug, Clone, Copy)]
pub struct RiskClassifier {
    tolerance_deg: f64,
}

impl Default for RiskClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE_DEG)
    }
}

impl RiskClassifier {
    pub fn new(tolerance_deg: f64) -> Self {
        Self { tolerance_deg }
    }

    pub fn tolerance_deg(&self) -> f64 {
        self.tolerance_deg
    }

    pub fn classify(&self, joint: JointKind, angle: Option<f64>) -> RiskTier {
        let Some(angle) = angle else {
            return RiskTier::Safe;
        };
        let band = joint.safe_band();
        if band.contains(angle) {
            RiskTier::Safe
        } else if band.contains_with_tolerance(angle, self.tolerance_deg) {
            RiskTier::MediumRisk
        } else {
            RiskTier::HighRisk
        }
    }

    /// Classify every joint of a frame and aggregate the overall tier.
    pub fn classify_set(&self, angles: JointAngleSet, timestamp: Timestamp) -> ClassifiedSnapshot {
        let shoulder_risk = self.classify(JointKind::Shoulder, angles.shoulder_rotation);
        let elbow_risk = self.classify(JointKind::Elbow, angles.elbow_bend);
        let hip_risk = self.classify(JointKind::Hip, angles.hip_rotation);
        let knee_risk = self.classify(JointKind::Knee, angles.knee_angle);

        let overall_risk = aggregate_overall([
            (angles.shoulder_rotation, shoulder_risk),
            (angles.elbow_bend, elbow_risk),
            (angles.hip_rotation, hip_risk),
            (angles.knee_angle, knee_risk),
        ]);

        ClassifiedSnapshot {
            angles,
            shoulder_risk,
            elbow_risk,
            hip_risk,
            knee_risk,
            overall_risk,
            timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// ClassifiedSnapshot
// ---------------------------------------------------------------------------

/// One fully classified frame.
///
/// Built by [`RiskClassifier::classify_set`]; `overall_risk` is always the
/// worst tier among the joints that have an angle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedSnapshot {
    #[serde(flatten)]
    pub angles: JointAngleSet,
    pub shoulder_risk: RiskTier,
    pub elbow_risk: RiskTier,
    pub hip_risk: RiskTier,
    pub knee_risk: RiskTier,
    /// `None` when no joint could be measured ("no data", not "safe").
    pub overall_risk: Option<RiskTier>,
    pub timestamp: Timestamp,
}

impl ClassifiedSnapshot {
    pub fn risk(&self, joint: JointKind) -> RiskTier {
        match joint {
            JointKind::Shoulder => self.shoulder_risk,
            JointKind::Elbow => self.elbow_risk,
            JointKind::Hip => self.hip_risk,
            JointKind::Knee => self.knee_risk,
        }
    }

    pub fn angle(&self, joint: JointKind) -> Option<f64> {
        self.angles.get(joint)
    }

    pub fn is_high_risk(&self) -> bool {
        self.overall_risk == Some(RiskTier::HighRisk)
    }

    /// Joints that were measured and classified at or above `MediumRisk`.
    pub fn at_risk_joints(&self) -> impl Iterator<Item = JointKind> + '_ {
        JointKind::ALL
            .into_iter()
            .filter(move |&j| self.angle(j).is_some() && self.risk(j).is_at_risk())
    }
}

// ---------------------------------------------------------------------------
// Numeric scores
// ---------------------------------------------------------------------------

/// Mean tier score of `overall_risk` across `snapshots` (0–100).
///
/// Frames without an overall tier count as 0. Returns 0 for an empty slice.
pub fn average_risk_score<'a, I>(snapshots: I) -> f64
where
    I: IntoIterator<Item = &'a ClassifiedSnapshot>,
{
    let (sum, count) = snapshots.into_iter().fold((0.0, 0usize), |(sum, n), s| {
        (sum + s.overall_risk.map(RiskTier::score).unwrap_or(0.0), n + 1)
    });
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Weighted per-joint risk score (0–100) of a single snapshot.
///
/// Weights are renormalised over the measured joints. Display only: the
/// authoritative tier is [`ClassifiedSnapshot::overall_risk`].
pub fn weighted_risk_score(snapshot: &ClassifiedSnapshot) -> Option<f64> {
    let (weighted, total_weight) = JointKind::ALL
        .into_iter()
        .filter(|&j| snapshot.angle(j).is_some())
        .fold((0.0, 0.0), |(acc, w), j| {
            (acc + snapshot.risk(j).score() * j.weight(), w + j.weight())
        });
    if total_weight == 0.0 {
        None
    } else {
        Some(weighted / total_weight)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
