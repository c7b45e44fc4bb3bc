//! End-of-session summary handed to the session recorder.

use serde::{Deserialize, Serialize};

use crate::risk::{weighted_risk_score, ClassifiedSnapshot, JointKind, RiskTier};
use crate::types::{AthleteId, InputMode, SessionId, Timestamp};

/// Sessions with fewer measured frames than this are not recorded.
pub const DEFAULT_MIN_SESSION_SAMPLES: usize = 10;

/// Per-joint aggregates over one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointSummary {
    pub joint: JointKind,
    /// Mean angle over the frames where the joint was measured.
    pub average_angle: Option<f64>,
    pub average_risk_score: f64,
    pub high_risk_frames: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub athlete_id: AthleteId,
    pub mode: InputMode,
    pub started_at: Timestamp,
    pub ended_at: Timestamp,
    pub duration_secs: i64,
    pub sample_count: usize,
    pub joints: Vec<JointSummary>,
    /// Mean weighted risk score (0-100) of the session's frames.
    pub overall_score: f64,
}

/// Identity of a finished session, used to build its summary.
#[derive(Debug, Clone, Copy)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub athlete_id: AthleteId,
    pub mode: InputMode,
    pub started_at: Timestamp,
    pub ended_at: Timestamp,
}

impl SessionSummary {
    /// Summarise the measured frames of a session.
    ///
    /// Frames without an overall tier are not samples. Returns `None` when
    /// fewer than `min_samples` frames remain.
    pub fn from_samples(
        info: SessionInfo,
        samples: &[ClassifiedSnapshot],
        min_samples: usize,
    ) -> Option<Self> {
        let measured: Vec<&ClassifiedSnapshot> =
            samples.iter().filter(|s| s.overall_risk.is_some()).collect();
        if measured.is_empty() || measured.len() < min_samples {
            return None;
        }

        let joints = JointKind::ALL
            .into_iter()
            .map(|joint| summarise_joint(joint, &measured))
            .collect();

        let scores: Vec<f64> = measured.iter().filter_map(|s| weighted_risk_score(s)).collect();
        let overall_score = scores.iter().sum::<f64>() / scores.len().max(1) as f64;

        Some(Self {
            session_id: info.session_id,
            athlete_id: info.athlete_id,
            mode: info.mode,
            started_at: info.started_at,
            ended_at: info.ended_at,
            duration_secs: (info.ended_at - info.started_at).num_seconds().max(0),
            sample_count: measured.len(),
            joints,
            overall_score,
        })
    }

    pub fn joint(&self, joint: JointKind) -> Option<&JointSummary> {
        self.joints.iter().find(|j| j.joint == joint)
    }
}

fn summarise_joint(joint: JointKind, samples: &[&ClassifiedSnapshot]) -> JointSummary {
    let present: Vec<(f64, RiskTier)> = samples
        .iter()
        .filter_map(|s| s.angle(joint).map(|a| (a, s.risk(joint))))
        .collect();

    if present.is_empty() {
        return JointSummary {
            joint,
            average_angle: None,
            average_risk_score: 0.0,
            high_risk_frames: 0,
        };
    }

    let n = present.len() as f64;
    JointSummary {
        joint,
        average_angle: Some(present.iter().map(|(a, _)| a).sum::<f64>() / n),
        average_risk_score: present.iter().map(|(_, t)| t.score()).sum::<f64>() / n,
        high_risk_frames: present
            .iter()
            .filter(|(_, t)| *t == RiskTier::HighRisk)
            .count(),
    }
}
