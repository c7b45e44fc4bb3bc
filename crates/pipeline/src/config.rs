use std::str::FromStr;
use std::time::Duration;

use smashguard_core::angle::DEFAULT_CONFIDENCE_THRESHOLD;
use smashguard_core::error::CoreError;
use smashguard_core::history::DEFAULT_HISTORY_CAPACITY;
use smashguard_core::risk::DEFAULT_TOLERANCE_DEG;
use smashguard_core::session_summary::DEFAULT_MIN_SESSION_SAMPLES;
use smashguard_core::threshold_validation::{
    validate_positive, validate_tolerance_deg, validate_unit_range,
};
use smashguard_core::types::AthleteId;

use crate::source::EngineConfig;

pub const DEFAULT_ACQUISITION_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_VIDEO_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_MIN_VIDEO_DIMENSION: u32 = 100;

/// Session controller configuration loaded from environment variables.
///
/// All fields have defaults matching the dashboard's behaviour.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum landmark visibility for a joint to be measured.
    pub confidence_threshold: f64,
    /// Margin around each safe band that still counts as medium risk.
    pub risk_tolerance_deg: f64,
    /// Bound on engine initialisation and input acquisition.
    pub acquisition_timeout: Duration,
    pub history_capacity: usize,
    /// Sessions with fewer measured frames are not recorded.
    pub min_session_samples: usize,
    pub max_video_bytes: u64,
    pub min_video_dimension: u32,
    pub athlete_id: AthleteId,
    pub engine: EngineConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            risk_tolerance_deg: DEFAULT_TOLERANCE_DEG,
            acquisition_timeout: Duration::from_secs(DEFAULT_ACQUISITION_TIMEOUT_SECS),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            min_session_samples: DEFAULT_MIN_SESSION_SAMPLES,
            max_video_bytes: DEFAULT_MAX_VIDEO_BYTES,
            min_video_dimension: DEFAULT_MIN_VIDEO_DIMENSION,
            athlete_id: 0,
            engine: EngineConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default     |
    /// |----------------------------|-------------|
    /// | `CONFIDENCE_THRESHOLD`     | `0.5`       |
    /// | `RISK_TOLERANCE_DEG`       | `10`        |
    /// | `ACQUISITION_TIMEOUT_SECS` | `10`        |
    /// | `HISTORY_CAPACITY`         | `100`       |
    /// | `MIN_SESSION_SAMPLES`      | `10`        |
    /// | `MAX_VIDEO_BYTES`          | `104857600` |
    /// | `MIN_VIDEO_DIMENSION`      | `100`       |
    /// | `ATHLETE_ID`               | `0`         |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            confidence_threshold: parse_or(
                get("CONFIDENCE_THRESHOLD"),
                "CONFIDENCE_THRESHOLD",
                defaults.confidence_threshold,
            )?,
            risk_tolerance_deg: parse_or(
                get("RISK_TOLERANCE_DEG"),
                "RISK_TOLERANCE_DEG",
                defaults.risk_tolerance_deg,
            )?,
            acquisition_timeout: Duration::from_secs(parse_or(
                get("ACQUISITION_TIMEOUT_SECS"),
                "ACQUISITION_TIMEOUT_SECS",
                DEFAULT_ACQUISITION_TIMEOUT_SECS,
            )?),
            history_capacity: parse_or(
                get("HISTORY_CAPACITY"),
                "HISTORY_CAPACITY",
                defaults.history_capacity,
            )?,
            min_session_samples: parse_or(
                get("MIN_SESSION_SAMPLES"),
                "MIN_SESSION_SAMPLES",
                defaults.min_session_samples,
            )?,
            max_video_bytes: parse_or(
                get("MAX_VIDEO_BYTES"),
                "MAX_VIDEO_BYTES",
                defaults.max_video_bytes,
            )?,
            min_video_dimension: parse_or(
                get("MIN_VIDEO_DIMENSION"),
                "MIN_VIDEO_DIMENSION",
                defaults.min_video_dimension,
            )?,
            athlete_id: parse_or(get("ATHLETE_ID"), "ATHLETE_ID", defaults.athlete_id)?,
            engine: defaults.engine,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_unit_range(self.confidence_threshold, "confidence_threshold")?;
        validate_tolerance_deg(self.risk_tolerance_deg, "risk_tolerance_deg")?;
        validate_positive(self.acquisition_timeout.as_secs_f64(), "acquisition_timeout")?;
        if self.history_capacity == 0 {
            return Err(CoreError::Validation(
                "history_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, name: &str, default: T) -> Result<T, CoreError> {
    match raw {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            CoreError::Validation(format!("{name} has an invalid value: {raw:?}"))
        }),
    }
}
