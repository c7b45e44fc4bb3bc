//! SmashGuard domain core.
//!
//! Pure, I/O-free building blocks of the risk-analysis pipeline: landmark
//! frames, joint angle math, risk classification, the rolling metrics
//! history and session summaries.

pub mod angle;
pub mod error;
pub mod event_names;
pub mod history;
pub mod landmark;
pub mod risk;
pub mod session_summary;
pub mod threshold_validation;
pub mod types;

pub use angle::{AngleExtractor, JointAngleSet, LimbAngles, Side};
pub use error::CoreError;
pub use history::{MetricField, MetricsHistory, SessionStats, TrendDirection};
pub use landmark::{Landmark, PoseFrame};
pub use risk::{ClassifiedSnapshot, JointKind, RiskClassifier, RiskTier};
pub use session_summary::{SessionInfo, SessionSummary};
pub use types::InputMode;
