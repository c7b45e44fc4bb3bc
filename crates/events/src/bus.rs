//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`AnalysisEvent`]s. It is
//! shared via `Arc<EventBus>` between the session controller, the alert
//! sinks and any background consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smashguard_core::types::{AthleteId, SessionId};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// AnalysisEvent
// ---------------------------------------------------------------------------

/// A lifecycle or risk event raised by the analysis pipeline.
///
/// Constructed via [`AnalysisEvent::new`] and enriched with the builder
/// methods [`with_session`](AnalysisEvent::with_session),
/// [`with_athlete`](AnalysisEvent::with_athlete), and
/// [`with_payload`](AnalysisEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisEvent {
    /// Dot-separated event name, e.g. `"session.started"`.
    pub event_type: String,

    /// Session the event belongs to, if any.
    pub session_id: Option<SessionId>,

    /// Athlete being analysed, if known.
    pub athlete_id: Option<AthleteId>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl AnalysisEvent {
    /// Create a new event with only the required `event_type`.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            session_id: None,
            athlete_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_athlete(mut self, athlete_id: AthleteId) -> Self {
        self.athlete_id = Some(athlete_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
///
/// # Usage
///
/// ```rust
/// use smashguard_events::bus::{AnalysisEvent, EventBus};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(AnalysisEvent::new("session.started"));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<AnalysisEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed messages are dropped
    /// and slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Events published while nobody is subscribed are dropped.
    pub fn publish(&self, event: AnalysisEvent) {
        // A SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
