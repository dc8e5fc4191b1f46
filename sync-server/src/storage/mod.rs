//! Storage layer for sync-server.
//!
//! Notes live in SQLite. [`SqliteStorage`] is both the write side
//! ([`NoteStore`]) and the read side (a [`sync_core::Collection`] the
//! composer queries).

mod sqlite;

pub use sqlite::SqliteStorage;

use crate::error::StorageError;
use crate::notes::{Note, NoteDraft};
use async_trait::async_trait;

/// Trait for note storage backends.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Insert a note, stamping `created_at` and `updated_at` with now.
    async fn insert_note(&self, draft: NoteDraft) -> Result<Note, StorageError>;

    /// Replace a note's writable fields and bump `updated_at`.
    ///
    /// Returns the reloaded note, or `None` if it does not exist.
    async fn update_note(&self, id: i64, draft: NoteDraft) -> Result<Option<Note>, StorageError>;

    /// Delete a note. Returns whether it existed.
    async fn delete_note(&self, id: i64) -> Result<bool, StorageError>;

    /// Get a note by id.
    async fn get_note(&self, id: i64) -> Result<Option<Note>, StorageError>;
}
