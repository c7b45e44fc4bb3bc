//! SmashGuard event bus, risk alerts and outbound delivery.
//!
//! - [`EventBus`] -- in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`AnalysisEvent`] -- the analysis event envelope.
//! - [`AlertDispatcher`] -- edge-triggered high-risk alerting.
//! - [`sink`] -- alert notification sinks (bus, log, webhook).
//! - [`delivery`] -- HTTP delivery of alerts and session summaries.
//! - [`EventJournal`] -- background task that logs every bus event.

pub mod alert;
pub mod bus;
pub mod delivery;
pub mod journal;
pub mod sink;

pub use alert::{AlertDispatcher, RiskAlert};
pub use bus::{AnalysisEvent, EventBus};
pub use delivery::session_record::{HttpSessionRecorder, SessionRecorder};
pub use delivery::webhook::WebhookDelivery;
pub use delivery::DeliveryError;
pub use journal::EventJournal;
pub use sink::{BusSink, LogSink, NotificationSink, WebhookSink};
