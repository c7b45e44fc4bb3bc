//! End-of-replay summary built from the metrics history.

use serde::Serialize;
use smashguard_core::history::{
    recommendations, MetricField, MetricsHistory, SessionStats, TrendDirection,
    DEFAULT_RECOMMENDATION, TREND_WINDOW,
};
use smashguard_core::risk::{JointKind, RiskTier};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JointReport {
    pub joint: JointKind,
    /// Mean angle over the last [`TREND_WINDOW`] entries.
    pub recent_average: Option<f64>,
    pub trend: TrendDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayReport {
    pub stats: SessionStats,
    pub latest_overall_risk: Option<RiskTier>,
    pub joints: Vec<JointReport>,
    pub recommendations: Vec<&'static str>,
}

impl ReplayReport {
    pub fn from_history(history: &MetricsHistory) -> Self {
        let joints = JointKind::ALL
            .into_iter()
            .map(|joint| JointReport {
                joint,
                recent_average: history.average(MetricField::from(joint), Some(TREND_WINDOW)),
                trend: history.trend(MetricField::from(joint)),
            })
            .collect();

        let latest = history.latest();
        Self {
            stats: history.session_stats(),
            latest_overall_risk: latest.and_then(|s| s.overall_risk),
            joints,
            recommendations: latest
                .map(recommendations)
                .unwrap_or_else(|| vec![DEFAULT_RECOMMENDATION]),
        }
    }

    pub fn log(&self) {
        tracing::info!(
            samples = self.stats.total_sessions,
            average_risk_score = self.stats.average_risk_score,
            days_since_last_high_risk = self.stats.days_since_last_high_risk,
            most_improved_joint = ?self.stats.most_improved_joint,
            latest_overall_risk = ?self.latest_overall_risk,
            "Replay summary"
        );
        for joint in &self.joints {
            tracing::info!(
                joint = %joint.joint,
                recent_average = ?joint.recent_average,
                trend = ?joint.trend,
                "Joint trend"
            );
        }
        for advice in &self.recommendations {
            tracing::info!("Recommendation: {advice}");
        }
    }
}
