//! Error types for artifact storage and mirroring.

use thiserror::Error;

/// Result type alias for artifact operations.
pub type ArtifactResult<T> = Result<T, ArtifactError>;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("invalid prefix: {0:?}")]
    InvalidPrefix(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage error on {key}: {message}")]
    Storage { key: String, message: String },

    #[error("failed to configure artifact store: {0}")]
    Config(String),

    #[error("failed to walk {path}: {message}")]
    Walk { path: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArtifactError {
    pub(crate) fn storage(key: impl Into<String>, err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { .. } => ArtifactError::NotFound(key.into()),
            other => ArtifactError::Storage {
                key: key.into(),
                message: other.to_string(),
            },
        }
    }
}
