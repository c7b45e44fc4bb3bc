//! Recording finished sessions with the dashboard backend.
//!
//! The controller hands every summary of a sufficiently long session to a
//! [`SessionRecorder`]. [`HttpSessionRecorder`] POSTs it to
//! `{base_url}/athletes/analysis`.

use std::time::Duration;

use async_trait::async_trait;
use smashguard_core::session_summary::SessionSummary;

use crate::delivery::{build_client, post_json_with_retry, DeliveryError, RETRY_DELAYS};

pub const ANALYSIS_PATH: &str = "/athletes/analysis";

#[async_trait]
pub trait SessionRecorder: Send + Sync {
    async fn record(&self, summary: &SessionSummary) -> Result<(), DeliveryError>;
}

pub struct HttpSessionRecorder {
    client: reqwest::Client,
    endpoint: String,
    retry_delays: Vec<Duration>,
}

impl HttpSessionRecorder {
    /// `base_url` is the backend API root, e.g. `http://localhost:5000/api`.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: build_client(),
            endpoint: format!("{}{ANALYSIS_PATH}", base_url.trim_end_matches('/')),
            retry_delays: RETRY_DELAYS.to_vec(),
        }
    }

    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Request body understood by the backend's analysis endpoint.
pub fn analysis_payload(summary: &SessionSummary) -> serde_json::Value {
    serde_json::json!({
        "athlete_id": summary.athlete_id,
        "session_duration": summary.duration_secs,
        "notes": format!("Completed live {} analysis session.", summary.mode),
        "overall_score": summary.overall_score,
        "summary": summary,
    })
}

#[async_trait]
impl SessionRecorder for HttpSessionRecorder {
    async fn record(&self, summary: &SessionSummary) -> Result<(), DeliveryError> {
        let payload = analysis_payload(summary);
        post_json_with_retry(&self.client, &self.endpoint, &payload, &self.retry_delays).await?;
        tracing::info!(
            session_id = %summary.session_id,
            samples = summary.sample_count,
            "Session summary recorded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(
            HttpSessionRecorder::new("http://localhost:5000/api/").endpoint(),
            "http://localhost:5000/api/athletes/analysis"
        );
        assert_eq!(
            HttpSessionRecorder::new("http://backend").endpoint(),
            "http://backend/athletes/analysis"
        );
    }
}
