//! Bounded rolling history of classified snapshots.
//!
//! The history keeps the most recent [`DEFAULT_HISTORY_CAPACITY`] frames in
//! arrival order and derives trend statistics, session statistics and
//! recommendations from them. It outlives individual sessions and is only
//! emptied by an explicit [`MetricsHistory::clear`].

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::risk::{self, ClassifiedSnapshot, JointKind, RiskTier};
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Number of most recent entries inspected by [`MetricsHistory::trend`].
pub const TREND_WINDOW: usize = 5;

/// Absolute first-to-last change below which a trend counts as stable.
pub const TREND_STABLE_EPSILON: f64 = 0.1;

/// Reported when no high-risk frame exists in a non-empty history.
pub const DEFAULT_DAYS_SINCE_HIGH_RISK: i64 = 7;

pub const DEFAULT_RECOMMENDATION: &str = "Maintain your excellent form and technique";

// ---------------------------------------------------------------------------
// Field selection
// ---------------------------------------------------------------------------

/// Numeric snapshot fields the history can average and trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricField {
    ShoulderRotation,
    ElbowBend,
    HipRotation,
    KneeAngle,
    /// Tier score of `overall_risk` (0/50/100).
    OverallRiskScore,
}

impl MetricField {
    fn value(self, snapshot: &ClassifiedSnapshot) -> Option<f64> {
        match self {
            MetricField::ShoulderRotation => snapshot.angles.shoulder_rotation,
            MetricField::ElbowBend => snapshot.angles.elbow_bend,
            MetricField::HipRotation => snapshot.angles.hip_rotation,
            MetricField::KneeAngle => snapshot.angles.knee_angle,
            MetricField::OverallRiskScore => snapshot.overall_risk.map(RiskTier::score),
        }
    }
}

impl From<JointKind> for MetricField {
    fn from(joint: JointKind) -> Self {
        match joint {
            JointKind::Shoulder => MetricField::ShoulderRotation,
            JointKind::Elbow => MetricField::ElbowBend,
            JointKind::Hip => MetricField::HipRotation,
            JointKind::Knee => MetricField::KneeAngle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Stable,
    Declining,
}

/// Aggregate statistics over the whole history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_sessions: usize,
    pub days_since_last_high_risk: i64,
    pub most_improved_joint: Option<JointKind>,
    pub average_risk_score: f64,
}

// ---------------------------------------------------------------------------
// MetricsHistory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsHistory {
    entries: VecDeque<ClassifiedSnapshot>,
    capacity: usize,
}

impl Default for MetricsHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl MetricsHistory {
    /// Create a history holding at most `capacity` entries (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Push to the back, evicting the oldest entry once full.
    pub fn append(&mut self, snapshot: ClassifiedSnapshot) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    pub fn latest(&self) -> Option<&ClassifiedSnapshot> {
        self.entries.back()
    }

    /// Entries oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ClassifiedSnapshot> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<ClassifiedSnapshot> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The most recent `n` entries, oldest first.
    fn recent(&self, n: usize) -> impl Iterator<Item = &ClassifiedSnapshot> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip)
    }

    /// Mean of `field` over the last `last_n` entries (all when `None`),
    /// skipping entries where the field is absent.
    pub fn average(&self, field: MetricField, last_n: Option<usize>) -> Option<f64> {
        let n = last_n.unwrap_or(self.entries.len());
        let (sum, count) = self
            .recent(n)
            .filter_map(|s| field.value(s))
            .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
        (count > 0).then(|| sum / count as f64)
    }

    /// Direction of `field` across the last [`TREND_WINDOW`] entries.
    ///
    /// Compares the first and last entry of the window only. A rise counts
    /// as improving.
    pub fn trend(&self, field: MetricField) -> TrendDirection {
        let window: Vec<&ClassifiedSnapshot> = self.recent(TREND_WINDOW).collect();
        let (Some(first), Some(last)) = (window.first(), window.last()) else {
            return TrendDirection::Stable;
        };
        if window.len() < 2 {
            return TrendDirection::Stable;
        }
        let (Some(first), Some(last)) = (field.value(first), field.value(last)) else {
            return TrendDirection::Stable;
        };

        let diff = last - first;
        if diff.abs() < TREND_STABLE_EPSILON {
            TrendDirection::Stable
        } else if diff > 0.0 {
            TrendDirection::Improving
        } else {
            TrendDirection::Declining
        }
    }

    /// Aggregate statistics as of the current wall-clock time.
    pub fn session_stats(&self) -> SessionStats {
        self.session_stats_at(chrono::Utc::now())
    }

    /// Aggregate statistics as of `now`.
    pub fn session_stats_at(&self, now: Timestamp) -> SessionStats {
        if self.entries.is_empty() {
            return SessionStats {
                total_sessions: 0,
                days_since_last_high_risk: 0,
                most_improved_joint: None,
                average_risk_score: 0.0,
            };
        }

        let days_since_last_high_risk = self
            .entries
            .iter()
            .rev()
            .find(|s| s.is_high_risk())
            .map(|s| (now - s.timestamp).num_days().max(0))
            .unwrap_or(DEFAULT_DAYS_SINCE_HIGH_RISK);

        SessionStats {
            total_sessions: self.entries.len(),
            days_since_last_high_risk,
            most_improved_joint: self.most_improved_joint(),
            average_risk_score: risk::average_risk_score(self.entries.iter()),
        }
    }

    /// Joint whose tier dropped the most from the first to the last entry.
    ///
    /// `None` when no joint improved or when the top improvement is shared.
    fn most_improved_joint(&self) -> Option<JointKind> {
        let (first, last) = (self.entries.front()?, self.entries.back()?);

        let mut best: Option<(JointKind, i32)> = None;
        let mut tied = false;
        for joint in JointKind::ALL {
            let decrease = first.risk(joint).rank() - last.risk(joint).rank();
            if decrease <= 0 {
                continue;
            }
            match best {
                Some((_, top)) if decrease == top => tied = true,
                Some((_, top)) if decrease < top => {}
                _ => {
                    best = Some((joint, decrease));
                    tied = false;
                }
            }
        }

        if tied {
            None
        } else {
            best.map(|(joint, _)| joint)
        }
    }
}

// ---------------------------------------------------------------------------
// Recommendations
// ---------------------------------------------------------------------------

fn recommendation_for(joint: JointKind) -> &'static str {
    match joint {
        JointKind::Knee => "Focus on proper knee alignment during lunges and jumps",
        JointKind::Hip => "Improve hip mobility and rotation with targeted exercises",
        JointKind::Shoulder => "Work on shoulder stability and proper racket motion",
        JointKind::Elbow => "Check your grip technique to reduce elbow strain",
    }
}

/// Canned coaching advice for every measured joint at or above
/// `MediumRisk`, knee first.
pub fn recommendations(snapshot: &ClassifiedSnapshot) -> Vec<&'static str> {
    const ORDER: [JointKind; 4] = [
        JointKind::Knee,
        JointKind::Hip,
        JointKind::Shoulder,
        JointKind::Elbow,
    ];

    let advice: Vec<&'static str> = ORDER
        .into_iter()
        .filter(|&j| snapshot.angle(j).is_some() && snapshot.risk(j).is_at_risk())
        .map(recommendation_for)
        .collect();

    if advice.is_empty() {
        vec![DEFAULT_RECOMMENDATION]
    } else {
        advice
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
