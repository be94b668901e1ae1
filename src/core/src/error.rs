use thiserror::Error;

/// a3s-offline error types
#[derive(Error, Debug)]
pub enum SyncError {
    /// Registry tag listing failed (after the client's own retries)
    #[error("Registry error: {repository} - {message}")]
    RegistryError { repository: String, message: String },

    /// Container runtime could not pull an image
    #[error("Pull failed: {reference} ({arch}) - {message}")]
    PullError {
        reference: String,
        arch: String,
        message: String,
    },

    /// Container runtime could not save/compress an image
    #[error("Export failed: {reference} ({arch}) - {message}")]
    ExportError {
        reference: String,
        arch: String,
        message: String,
    },

    /// Image reference could not be parsed
    #[error("Invalid image reference: {0}")]
    ReferenceError(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    TimeoutError(String),

    /// Snapshot file could not be read or written
    #[error("Snapshot error: {0}")]
    SnapshotError(String),

    /// Checkpoint file could not be written
    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for SyncError {
    fn from(err: serde_yaml::Error) -> Self {
        SyncError::SerializationError(err.to_string())
    }
}

/// Result type alias for a3s-offline operations
pub type Result<T> = std::result::Result<T, SyncError>;
