//! SmashGuard session pipeline.
//!
//! Drives a real-time analysis session: acquires camera or video input,
//! pumps frames through the pose engine and the risk classifier, and
//! guarantees that every acquired resource is released when the session
//! ends.

pub mod config;
pub mod controller;
pub mod error;
mod pump;
pub mod source;
pub mod state;

pub use config::PipelineConfig;
pub use controller::{SessionController, SessionControllerBuilder, SnapshotObserver, SubscriptionId};
pub use error::{AcquisitionError, EngineError, SessionError};
pub use source::{
    CameraConstraints, CaptureProvider, EngineConfig, FrameSource, FrameUpdate, InputRequest,
    OverlayAngle, OverlayFrame, PoseEngine, RawFrame, RenderSurface,
};
pub use state::SessionState;
