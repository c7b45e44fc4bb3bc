//! Webhook delivery of high-risk alerts.
//!
//! [`WebhookDelivery`] POSTs a JSON-encoded [`RiskAlert`] to an external
//! URL using the shared retry policy of [`delivery`](crate::delivery).

use std::time::Duration;

use crate::alert::RiskAlert;
use crate::delivery::{build_client, post_json_with_retry, DeliveryError, RETRY_DELAYS};

pub struct WebhookDelivery {
    client: reqwest::Client,
    retry_delays: Vec<Duration>,
}

impl WebhookDelivery {
    pub fn new() -> Self {
        Self {
            client: build_client(),
            retry_delays: RETRY_DELAYS.to_vec(),
        }
    }

    /// Override the backoff schedule.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    /// Deliver an alert to a webhook URL with retry.
    pub async fn deliver(&self, url: &str, alert: &RiskAlert) -> Result<(), DeliveryError> {
        let payload = serde_json::json!({
            "title": alert.title,
            "message": alert.message,
            "type": alert.severity,
            "session_id": alert.session_id,
            "angles": alert.angles,
            "at_risk_joints": alert.at_risk_joints,
            "timestamp": alert.timestamp,
        });
        post_json_with_retry(&self.client, url, &payload, &self.retry_delays).await
    }
}

impl Default for WebhookDelivery {
    fn default() -> Self {
        Self::new()
    }
}
