//! Error types for synced resources.

use thiserror::Error;

/// Errors shared across the synced-resources crates.
#[derive(Debug, Error)]
pub enum SyncError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),
}
