//! Replay agent configuration.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// JSON-lines landmark recording to replay.
    pub replay_path: PathBuf,
    /// Backend base URL; sessions are recorded there when set.
    pub backend_url: Option<String>,
    /// Endpoint that receives high-risk alerts when set.
    pub alert_webhook_url: Option<String>,
    /// Pace frames at the recorded frame rate.
    pub realtime: bool,
    pub log_format: LogFormat,
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var             | Required | Default  |
    /// |---------------------|----------|----------|
    /// | `REPLAY_PATH`       | yes      |          |
    /// | `BACKEND_URL`       | no       | (unset)  |
    /// | `ALERT_WEBHOOK_URL` | no       | (unset)  |
    /// | `REPLAY_REALTIME`   | no       | `false`  |
    /// | `LOG_FORMAT`        | no       | `pretty` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let replay_path = get("REPLAY_PATH")
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("REPLAY_PATH"))?;

        let realtime = match get("REPLAY_REALTIME").as_deref().map(str::trim) {
            None => false,
            Some("1" | "true" | "yes") => true,
            Some("0" | "false" | "no") => false,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "REPLAY_REALTIME",
                    value: other.to_string(),
                })
            }
        };

        let log_format = match get("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            replay_path,
            backend_url: get("BACKEND_URL"),
            alert_webhook_url: get("ALERT_WEBHOOK_URL"),
            realtime,
            log_format,
        })
    }
}
