//! Error types for sync-server.

use std::path::PathBuf;
use sync_core::{CollectionError, ComposeError};
use sync_types::SyncError;

/// Main error type for sync-server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Response composition failed.
    #[error("composition error: {0}")]
    Compose(#[from] ComposeError),

    /// Rendering failed.
    #[error("render error: {0}")]
    Render(#[from] SyncError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be decoded.
    #[error("corrupt row {id}: {reason}")]
    CorruptRow {
        /// Primary key of the row.
        id: i64,
        /// What was wrong with it.
        reason: String,
    },

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },
}

impl From<StorageError> for CollectionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::CorruptRow { id, reason } => {
                CollectionError::CorruptRow(format!("{id}: {reason}"))
            }
            other => CollectionError::backend(other),
        }
    }
}
