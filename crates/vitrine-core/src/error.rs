//! Error types for vitrine.

use thiserror::Error;

/// Result type alias using vitrine's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for vitrine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Attached media not found
    #[error("Media not found: {0}")]
    MediaNotFound(uuid::Uuid),

    /// Pool media not found
    #[error("Pool media not found: {0}")]
    PoolMediaNotFound(uuid::Uuid),

    /// Storage gateway operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// The id is already held by another representation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for the not-found family of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::MediaNotFound(_) | Error::PoolMediaNotFound(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
