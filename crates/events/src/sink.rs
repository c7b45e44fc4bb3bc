//! Alert notification sinks.
//!
//! Sinks are called synchronously from the frame pump, so anything slow
//! (HTTP delivery) is spawned onto the runtime instead of awaited.

use std::sync::Arc;

use smashguard_core::event_names::EVENT_RISK_HIGH_DETECTED;

use crate::alert::RiskAlert;
use crate::bus::{AnalysisEvent, EventBus};
use crate::delivery::webhook::WebhookDelivery;

pub trait NotificationSink: Send + Sync {
    fn notify(&self, alert: &RiskAlert);
}

// ---------------------------------------------------------------------------
// BusSink
// ---------------------------------------------------------------------------

/// Publishes alerts as `risk.high_detected` events.
pub struct BusSink {
    bus: Arc<EventBus>,
}

impl BusSink {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

impl NotificationSink for BusSink {
    fn notify(&self, alert: &RiskAlert) {
        let payload = match serde_json::to_value(alert) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    session_id = ?alert.session_id,
                    error = %e,
                    "Failed to serialise risk alert, not publishing"
                );
                return;
            }
        };
        let mut event = AnalysisEvent::new(EVENT_RISK_HIGH_DETECTED).with_payload(payload);
        if let Some(session_id) = alert.session_id {
            event = event.with_session(session_id);
        }
        self.bus.publish(event);
    }
}

// ---------------------------------------------------------------------------
// LogSink
// ---------------------------------------------------------------------------

pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, alert: &RiskAlert) {
        tracing::warn!(
            session_id = ?alert.session_id,
            joints = ?alert.at_risk_joints,
            "{}: {}",
            alert.title,
            alert.message
        );
    }
}

// ---------------------------------------------------------------------------
// WebhookSink
// ---------------------------------------------------------------------------

/// Forwards alerts to an external webhook in a background task.
pub struct WebhookSink {
    delivery: Arc<WebhookDelivery>,
    url: String,
}

impl WebhookSink {
    pub fn new(delivery: Arc<WebhookDelivery>, url: impl Into<String>) -> Self {
        Self {
            delivery,
            url: url.into(),
        }
    }
}

impl NotificationSink for WebhookSink {
    fn notify(&self, alert: &RiskAlert) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(url = %self.url, "No async runtime, dropping webhook alert");
            return;
        };
        let delivery = Arc::clone(&self.delivery);
        let url = self.url.clone();
        let alert = alert.clone();
        handle.spawn(async move {
            // Failures are logged by the delivery layer.
            let _ = delivery.deliver(&url, &alert).await;
        });
    }
}
