//! Well-known analysis event type constants.
//!
//! Used by the session controller when publishing to the event bus and by
//! consumers filtering on `AnalysisEvent::event_type`.

/// A session reached the active state and its frame pump is running.
pub const EVENT_SESSION_STARTED: &str = "session.started";

/// A session was torn down, by request or at end of input.
pub const EVENT_SESSION_STOPPED: &str = "session.stopped";

/// Engine initialisation or input acquisition failed.
pub const EVENT_SESSION_START_FAILED: &str = "session.start_failed";

/// The overall tier entered `HighRisk`.
pub const EVENT_RISK_HIGH_DETECTED: &str = "risk.high_detected";

/// A session summary was handed to the recorder.
pub const EVENT_SESSION_RECORDED: &str = "session.recorded";
