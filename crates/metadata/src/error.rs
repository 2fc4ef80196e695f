//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Malformed request; nothing was mutated.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MetadataError {
    /// Whether the operation hit a transient lock conflict.
    ///
    /// Transient failures roll back the whole transaction; callers retry the
    /// entire operation, never a sub-range of it.
    pub fn is_transient(&self) -> bool {
        match self {
            MetadataError::Database(sqlx::Error::Database(db)) => {
                // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes.
                db.code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .is_some_and(|code| matches!(code & 0xff, 5 | 6))
            }
            MetadataError::Database(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }
}

impl From<codeintel_core::Error> for MetadataError {
    fn from(err: codeintel_core::Error) -> Self {
        match err {
            codeintel_core::Error::InvalidStateTransition { from, to } => {
                MetadataError::InvalidStateTransition { from, to }
            }
            codeintel_core::Error::Config(msg) => MetadataError::Config(msg),
            other => MetadataError::Validation(other.to_string()),
        }
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
