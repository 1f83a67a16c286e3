//! Error types for freshcheck

/// Result type alias using freshcheck's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for freshcheck operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed image, unparseable label, missing required field
    #[error("invalid input: {0}")]
    Input(String),

    /// The backend faulted while predicting
    #[error("classification failed: {0}")]
    Inference(String),

    /// The backend faulted while training, or a label could not be remapped
    #[error("training failed: {0}")]
    Training(String),

    /// The backend does not implement the requested operation
    #[error("operation not supported: {0}")]
    Unsupported(String),

    /// Requested artifact, history entry or prediction does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Registry storage errors
    #[error("storage error: {0}")]
    Storage(String),

    /// Timeout errors
    #[error("operation timed out")]
    Timeout,

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

/// Response class at the serving boundary.
///
/// There is deliberately no server-error class: every fault is folded into
/// one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
}

impl Error {
    /// Create a new input error
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    /// Create a new inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new training error
    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    /// Create a new unsupported-operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a new not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether repeating the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Input(_) | Self::Unsupported(_) | Self::NotFound(_) | Self::Config(_)
        )
    }

    /// Map this error onto a serving-boundary response class.
    pub fn status(&self) -> Status {
        match self {
            Self::NotFound(_) => Status::NotFound,
            _ => Status::BadRequest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_is_not_retryable() {
        assert!(!Error::unsupported("retrain").is_retryable());
        assert!(!Error::input("bad label").is_retryable());
        assert!(Error::training("nan loss").is_retryable());
        assert!(Error::Timeout.is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::not_found("artifact 3").status(), Status::NotFound);
        assert_eq!(Error::inference("shape").status(), Status::BadRequest);
        assert_eq!(Error::internal("boom").status(), Status::BadRequest);
    }
}
