//! SQLite storage backend for sync-server.

use super::NoteStore;
use crate::error::StorageError;
use crate::notes::{Note, NoteDraft};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use sync_core::{
    instant_from_millis, Collection, CollectionError, Direction, ResourceDescriptor, Scope,
};
use sync_types::RecordId;

const NOTE_COLUMNS: &str = "id, title, body, status, tags, created_at, updated_at";

/// How a column's filter values are bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Integer,
    Text,
    Time,
}

/// Columns that may appear in generated SQL.
fn column(name: &str) -> Option<(&'static str, ColumnKind)> {
    match name {
        "id" => Some(("id", ColumnKind::Integer)),
        "title" => Some(("title", ColumnKind::Text)),
        "body" => Some(("body", ColumnKind::Text)),
        "status" => Some(("status", ColumnKind::Text)),
        "created_at" => Some(("created_at", ColumnKind::Time)),
        "updated_at" => Some(("updated_at", ColumnKind::Time)),
        _ => None,
    }
}

/// A filter value converted for binding.
enum Bound {
    Int(i64),
    Text(String),
}

fn bind_value(kind: ColumnKind, raw: &str) -> Option<Bound> {
    let raw = raw.trim();
    match kind {
        ColumnKind::Text => Some(Bound::Text(raw.to_string())),
        ColumnKind::Integer => raw.parse().ok().map(Bound::Int),
        ColumnKind::Time => raw
            .parse::<i64>()
            .ok()
            .or_else(|| {
                DateTime::parse_from_rfc3339(raw)
                    .ok()
                    .map(|t| t.timestamp_millis())
            })
            .map(Bound::Int),
    }
}

/// SQLite-based note storage.
///
/// Uses WAL mode for concurrent reads/writes.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
    descriptor: ResourceDescriptor,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("resource", &self.descriptor.plural())
            .finish_non_exhaustive()
    }
}

impl SqliteStorage {
    /// Create a new SQLite storage from a database path.
    ///
    /// Creates the database file if it doesn't exist.
    pub async fn new(path: &Path) -> Result<Self, StorageError> {
        let url = path.to_str().ok_or_else(|| StorageError::InvalidPath {
            path: path.to_path_buf(),
        })?;
        let options = SqliteConnectOptions::from_str(url)
            .map_err(StorageError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self {
            pool,
            descriptor: Note::descriptor(),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Create an in-memory SQLite storage (for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StorageError::Database)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // One connection that never expires: each in-memory connection is
        // its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self {
            pool,
            descriptor: Note::descriptor(),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                body TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'open',
                tags TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_notes_updated_at ON notes(updated_at)")
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_notes_status ON notes(status)")
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(())
    }

    /// Insert a note with explicit timestamps.
    pub async fn insert_note_at(
        &self,
        draft: NoteDraft,
        at: DateTime<Utc>,
    ) -> Result<Note, StorageError> {
        let millis = at.timestamp_millis();
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO notes (title, body, status, tags, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            RETURNING id
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.body)
        .bind(&draft.status)
        .bind(tags_json(&draft.tags))
        .bind(millis)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        tracing::debug!(id, "note inserted");
        self.get_note(id).await?.ok_or(StorageError::CorruptRow {
            id,
            reason: "inserted row vanished".to_string(),
        })
    }

    /// Update a note, moving `updated_at` to `at` or, if that would not
    /// advance it, one millisecond past its current value.
    pub async fn update_note_at(
        &self,
        id: i64,
        draft: NoteDraft,
        at: DateTime<Utc>,
    ) -> Result<Option<Note>, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE notes
            SET title = ?1, body = ?2, status = ?3, tags = ?4,
                updated_at = MAX(?5, updated_at + 1)
            WHERE id = ?6
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.body)
        .bind(&draft.status)
        .bind(tags_json(&draft.tags))
        .bind(at.timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_note(id).await
    }

    /// Build `SELECT <columns> FROM notes WHERE ...` for `scope`, without
    /// ordering or window. The delta is not part of the SQL; see [`settle`].
    fn select(&self, columns: &str, scope: &Scope) -> QueryBuilder<'static, Sqlite> {
        let mut qb = QueryBuilder::new(format!("SELECT {columns} FROM notes WHERE 1 = 1"));

        if let Some(ids) = &scope.ids {
            push_id_set(&mut qb, ids);
        }
        if let Some(within) = &scope.within {
            push_id_set(&mut qb, within);
        }

        for (name, values) in &scope.filter {
            let Some((column, kind)) = column(name).filter(|_| self.descriptor.is_column(name))
            else {
                tracing::debug!(column = %name, "ignoring filter on unknown column");
                continue;
            };
            let bound: Vec<Bound> = values.iter().filter_map(|v| bind_value(kind, v)).collect();
            if bound.is_empty() {
                qb.push(" AND 0");
                continue;
            }
            qb.push(format!(" AND {column} IN ("));
            let mut list = qb.separated(", ");
            for value in bound {
                match value {
                    Bound::Int(v) => list.push_bind(v),
                    Bound::Text(v) => list.push_bind(v),
                };
            }
            list.push_unseparated(")");
        }

        if !scope.tags.is_empty() {
            qb.push(" AND (SELECT COUNT(DISTINCT value) FROM json_each(notes.tags) WHERE value IN (");
            let mut list = qb.separated(", ");
            for tag in &scope.tags {
                list.push_bind(tag.clone());
            }
            list.push_unseparated(")) = ");
            qb.push_bind(scope.tags.len() as i64);
        }

        qb
    }

    /// Append ordering and window. Scopes with `within` are ordered in
    /// Rust instead, and scopes with a delta are windowed in Rust.
    fn push_order_range(&self, qb: &mut QueryBuilder<'static, Sqlite>, scope: &Scope) {
        if scope.within.is_some() {
            return;
        }

        let order = scope
            .order
            .as_ref()
            .filter(|order| self.descriptor.is_orderable(order))
            .and_then(|order| column(&order.field).map(|(col, _)| (col, order.direction)));
        match order {
            Some((col, direction)) if col != "id" => {
                let dir = match direction {
                    Direction::Asc => "ASC",
                    Direction::Desc => "DESC",
                };
                qb.push(format!(" ORDER BY {col} {dir}, id ASC"));
            }
            Some((_, Direction::Desc)) => {
                qb.push(" ORDER BY id DESC");
            }
            _ => {
                qb.push(" ORDER BY id ASC");
            }
        }

        if let Some(range) = scope.range.filter(|_| scope.delta.is_none()) {
            qb.push(" LIMIT ");
            qb.push_bind(i64::try_from(range.limit).unwrap_or(i64::MAX));
            qb.push(" OFFSET ");
            qb.push_bind(i64::try_from(range.offset).unwrap_or(i64::MAX));
        }
    }

    async fn query_notes(&self, scope: &Scope) -> Result<Vec<Note>, StorageError> {
        let mut qb = self.select(NOTE_COLUMNS, scope);
        self.push_order_range(&mut qb, scope);
        let rows = qb
            .build_query_as::<NoteRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Database)?;
        let notes = rows
            .into_iter()
            .map(Note::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(settle(notes, scope, |n| (n.id, n.updated_at.timestamp_millis())))
    }

    async fn query_ids(&self, scope: &Scope) -> Result<Vec<i64>, StorageError> {
        let mut qb = self.select("id, updated_at", scope);
        self.push_order_range(&mut qb, scope);
        let rows = qb
            .build_query_as::<(i64, i64)>()
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Database)?;
        Ok(settle(rows, scope, |row| *row)
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }
}

/// Apply the parts of `scope` evaluated in Rust: the delta, `within`
/// ordering, and the window when SQL could not apply it.
///
/// Token entries are never expanded into SQL; a token may hold thousands.
fn settle<T>(items: Vec<T>, scope: &Scope, key: impl Fn(&T) -> (i64, i64)) -> Vec<T> {
    let mut items = items;
    if let Some(delta) = &scope.delta {
        items.retain(|item| {
            let (id, updated_at) = key(item);
            delta.admits(&RecordId::Int(id), instant_from_millis(updated_at))
        });
    }

    if let Some(within) = &scope.within {
        let position: HashMap<i64, usize> = within
            .iter()
            .enumerate()
            .rev()
            .filter_map(|(idx, id)| id.as_int().map(|id| (id, idx)))
            .collect();
        items.retain(|item| position.contains_key(&key(item).0));
        items.sort_by_key(|item| position.get(&key(item).0).copied().unwrap_or(usize::MAX));
    } else if scope.delta.is_none() {
        return items;
    }

    match scope.range {
        Some(range) => items
            .into_iter()
            .skip(usize::try_from(range.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(range.limit).unwrap_or(usize::MAX))
            .collect(),
        None => items,
    }
}

fn push_id_set(qb: &mut QueryBuilder<'static, Sqlite>, ids: &[RecordId]) {
    let ints: Vec<i64> = ids.iter().filter_map(RecordId::as_int).collect();
    if ints.is_empty() {
        qb.push(" AND 0");
        return;
    }
    qb.push(" AND id IN (");
    let mut list = qb.separated(", ");
    for id in ints {
        list.push_bind(id);
    }
    list.push_unseparated(")");
}

fn tags_json(tags: &[String]) -> String {
    Value::from(tags.to_vec()).to_string()
}

#[async_trait]
impl NoteStore for SqliteStorage {
    async fn insert_note(&self, draft: NoteDraft) -> Result<Note, StorageError> {
        self.insert_note_at(draft, Utc::now()).await
    }

    async fn update_note(&self, id: i64, draft: NoteDraft) -> Result<Option<Note>, StorageError> {
        self.update_note_at(id, draft, Utc::now()).await
    }

    async fn delete_note(&self, id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM notes WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_note(&self, id: i64) -> Result<Option<Note>, StorageError> {
        let row = sqlx::query_as::<_, NoteRow>(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        match row {
            Some(r) => Ok(Some(r.try_into()?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Collection for SqliteStorage {
    type Record = Note;

    fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    async fn count(&self, scope: &Scope) -> Result<u64, CollectionError> {
        if scope.within.is_some() || scope.range.is_some() || scope.delta.is_some() {
            return Ok(self.query_ids(scope).await?.len() as u64);
        }
        let mut qb = self.select("COUNT(DISTINCT id)", scope);
        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::Database)?;
        Ok(count as u64)
    }

    async fn pluck_ids(&self, scope: &Scope) -> Result<Vec<RecordId>, CollectionError> {
        Ok(self
            .query_ids(scope)
            .await?
            .into_iter()
            .map(RecordId::Int)
            .collect())
    }

    async fn fetch(&self, scope: &Scope) -> Result<Vec<Note>, CollectionError> {
        Ok(self.query_notes(scope).await?)
    }

    async fn find(&self, id: &RecordId) -> Result<Option<Note>, CollectionError> {
        match id.as_int() {
            Some(id) => Ok(self.get_note(id).await?),
            None => Ok(None),
        }
    }
}

/// Internal row type for SQLite queries.
#[derive(sqlx::FromRow)]
struct NoteRow {
    id: i64,
    title: String,
    body: String,
    status: String,
    tags: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<NoteRow> for Note {
    type Error = StorageError;

    fn try_from(row: NoteRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = |reason: &str| StorageError::CorruptRow {
            id,
            reason: reason.to_string(),
        };
        let tags: Vec<String> =
            serde_json::from_str(&row.tags).map_err(|_| corrupt("tags are not a JSON string array"))?;
        Ok(Note {
            id,
            created_at: instant_from_millis(row.created_at)
                .ok_or_else(|| corrupt("created_at out of range"))?,
            updated_at: instant_from_millis(row.updated_at)
                .ok_or_else(|| corrupt("updated_at out of range"))?,
            title: row.title,
            body: row.body,
            status: row.status,
            tags,
        })
    }
}
