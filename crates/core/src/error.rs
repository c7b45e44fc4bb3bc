#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
