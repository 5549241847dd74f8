use thiserror::Error;

/// Application-wide error types for gleaner.
#[derive(Error, Debug)]
pub enum AppError {
    /// The source answered 429 Too Many Requests.
    #[error("Throttled by source, retry after {retry_after_ms}ms")]
    Throttled { retry_after_ms: u64 },

    /// Non-success, non-throttling HTTP response.
    #[error("HTTP {status} for {url}")]
    Fetch { status: u16, url: String },

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// A raw entry could not be mapped onto a `Record`.
    #[error("Normalization error: {0}")]
    Normalization(String),

    /// Manifest checksum or record count does not match its contents.
    #[error("Manifest integrity error: expected {expected}, got {actual}")]
    ManifestIntegrity { expected: String, actual: String },

    /// One of the publish steps (create, upload, finalize, submit) failed.
    #[error("Publish step '{step}' failed: {message}")]
    PublishStep {
        step: PublishStep,
        message: String,
    },

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),

    /// The run was cancelled by the caller.
    #[error("Run cancelled")]
    Cancelled,
}

/// The ordered steps of a publish operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStep {
    CreateAttachment,
    Upload,
    Finalize,
    CreateSubmission,
}

impl std::fmt::Display for PublishStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishStep::CreateAttachment => write!(f, "create-attachment"),
            PublishStep::Upload => write!(f, "upload"),
            PublishStep::Finalize => write!(f, "finalize"),
            PublishStep::CreateSubmission => write!(f, "create-submission"),
        }
    }
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::Throttled { .. }
        )
    }

    /// Shorthand for a failed publish step.
    pub fn publish(step: PublishStep, message: impl Into<String>) -> Self {
        AppError::PublishStep {
            step,
            message: message.into(),
        }
    }
}
