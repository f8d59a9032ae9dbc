use thiserror::Error;

pub type Result<T, E = WeftError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum WeftError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("codec error: {0}")]
    Codec(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("coordinator error: {0}")]
    Coordinator(String),
    #[error("viewer error: {0}")]
    Viewer(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WeftError {
    /// Whether the failure was caused by the caller rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, WeftError::Validation(_))
    }
}
