use smashguard_core::error::CoreError;

/// Why an input source could not be opened or validated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquisitionError {
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Invalid video dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("File too large: {size_bytes} bytes (limit {limit_bytes})")]
    FileTooLarge { size_bytes: u64, limit_bytes: u64 },

    #[error("Corrupt input: {0}")]
    Corrupt(String),

    #[error("Timed out after {0} s")]
    Timeout(u64),
}

/// Failure reported by the external pose engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Pose engine error: {0}")]
pub struct EngineError(pub String);

/// Errors surfaced by the session controller.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("Pose engine initialisation failed: {0}")]
    EngineInit(String),

    #[error("Classification failed: {0}")]
    Classification(#[from] CoreError),

    #[error("A session is already running")]
    AlreadyRunning,

    #[error("Session start cancelled by stop request")]
    Cancelled,

    #[error("Session task failed: {0}")]
    Internal(String),
}

impl SessionError {
    /// Whether calling `start` again may succeed without user action.
    pub fn is_retriable(&self) -> bool {
        match self {
            SessionError::Acquisition(AcquisitionError::PermissionDenied) => false,
            SessionError::Acquisition(AcquisitionError::UnsupportedFormat(_)) => false,
            SessionError::Acquisition(AcquisitionError::FileTooLarge { .. }) => false,
            SessionError::Acquisition(AcquisitionError::InvalidDimensions { .. }) => false,
            SessionError::Acquisition(AcquisitionError::Corrupt(_)) => false,
            SessionError::Acquisition(_) => true,
            SessionError::EngineInit(_) => true,
            SessionError::Classification(_) => true,
            SessionError::AlreadyRunning => false,
            SessionError::Cancelled => true,
            SessionError::Internal(_) => false,
        }
    }
}
