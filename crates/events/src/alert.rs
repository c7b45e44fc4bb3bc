//! Edge-triggered high-risk alerting.
//!
//! [`AlertDispatcher`] watches the stream of classified snapshots and raises
//! one [`RiskAlert`] per high-risk episode: an episode starts when the
//! overall tier becomes `HighRisk` and ends when a later measured frame
//! drops below it. Frames without an overall tier leave the episode
//! untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smashguard_core::angle::JointAngleSet;
use smashguard_core::risk::{ClassifiedSnapshot, JointKind, RiskTier};
use smashguard_core::types::SessionId;

pub const ALERT_TITLE: &str = "High Injury Risk Detected";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
}

/// Notification raised on entry into `HighRisk`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub session_id: Option<SessionId>,
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub angles: JointAngleSet,
    /// Measured joints at or above `MediumRisk` in the triggering frame.
    pub at_risk_joints: Vec<JointKind>,
    pub timestamp: DateTime<Utc>,
}

impl RiskAlert {
    pub fn from_snapshot(snapshot: &ClassifiedSnapshot, session_id: Option<SessionId>) -> Self {
        Self {
            session_id,
            title: ALERT_TITLE.to_string(),
            message: alert_message(&snapshot.angles),
            severity: AlertSeverity::Warning,
            angles: snapshot.angles,
            at_risk_joints: snapshot.at_risk_joints().collect(),
            timestamp: snapshot.timestamp,
        }
    }
}

fn fmt_angle(angle: Option<f64>) -> String {
    match angle {
        Some(a) => format!("{a:.1}°"),
        None => "n/a".to_string(),
    }
}

/// Dashboard-style message listing all four angles.
pub fn alert_message(angles: &JointAngleSet) -> String {
    format!(
        "High risk detected: Knee Angle {}, Hip Rotation {}, Shoulder Rotation {}, Elbow Bend {}",
        fmt_angle(angles.knee_angle),
        fmt_angle(angles.hip_rotation),
        fmt_angle(angles.shoulder_rotation),
        fmt_angle(angles.elbow_bend),
    )
}

// ---------------------------------------------------------------------------
// AlertDispatcher
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct AlertDispatcher {
    session_id: Option<SessionId>,
    in_episode: bool,
}

impl AlertDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget any open episode and tag future alerts with `session_id`.
    pub fn reset(&mut self, session_id: Option<SessionId>) {
        self.session_id = session_id;
        self.in_episode = false;
    }

    pub fn in_episode(&self) -> bool {
        self.in_episode
    }

    /// Inspect one snapshot; returns an alert only on entry into `HighRisk`.
    pub fn on_snapshot(&mut self, snapshot: &ClassifiedSnapshot) -> Option<RiskAlert> {
        match snapshot.overall_risk {
            None => None,
            Some(RiskTier::HighRisk) if self.in_episode => None,
            Some(RiskTier::HighRisk) => {
                self.in_episode = true;
                Some(RiskAlert::from_snapshot(snapshot, self.session_id))
            }
            Some(_) => {
                self.in_episode = false;
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
