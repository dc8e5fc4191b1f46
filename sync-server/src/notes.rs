//! The `notes` resource.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sync_core::{AdditionalData, Record, ResourceDescriptor, SyncClock};
use sync_types::{FieldValue, RecordId, ValidationErrors};

/// Maximum title length in characters.
pub const MAX_TITLE_LENGTH: usize = 200;

/// Status given to notes created without one.
pub const DEFAULT_STATUS: &str = "open";

/// A stored note.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    /// Primary key.
    pub id: i64,
    /// Title (never blank).
    pub title: String,
    /// Free-form body.
    pub body: String,
    /// Workflow status.
    pub status: String,
    /// Tags.
    pub tags: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Descriptor for the notes table.
    pub fn descriptor() -> ResourceDescriptor {
        ResourceDescriptor::new("note").with_columns(["title", "body", "status", "created_at"])
    }
}

impl Record for Note {
    fn id(&self) -> RecordId {
        RecordId::Int(self.id)
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => Some(FieldValue::Int(self.id)),
            "title" => Some(FieldValue::Text(self.title.clone())),
            "body" => Some(FieldValue::Text(self.body.clone())),
            "status" => Some(FieldValue::Text(self.status.clone())),
            "created_at" => Some(FieldValue::Time(self.created_at)),
            "updated_at" => Some(FieldValue::Time(self.updated_at)),
            _ => None,
        }
    }

    fn tags(&self) -> Vec<String> {
        self.tags.clone()
    }
}

/// Writable fields of a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDraft {
    /// Title.
    pub title: String,
    /// Body.
    pub body: String,
    /// Status.
    pub status: String,
    /// Tags, trimmed and deduplicated.
    pub tags: Vec<String>,
}

impl NoteDraft {
    /// Check the draft, collecting every problem.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.title.trim().is_empty() {
            errors.add("title", "can't be blank");
        } else if self.title.chars().count() > MAX_TITLE_LENGTH {
            errors.add(
                "title",
                format!("is too long (maximum is {MAX_TITLE_LENGTH} characters)"),
            );
        }
        if self.status.trim().is_empty() {
            errors.add("status", "can't be blank");
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Note attributes as sent by clients. Missing fields keep their
/// current value on update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoteParams {
    /// Title.
    pub title: Option<String>,
    /// Body.
    pub body: Option<String>,
    /// Status.
    pub status: Option<String>,
    /// Tags.
    pub tags: Option<Vec<String>>,
}

/// Request body for create and update: `{"note": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct NoteEnvelope {
    /// The attributes.
    pub note: NoteParams,
}

impl NoteParams {
    /// Merge onto `existing` (or blank defaults for a new note).
    pub fn into_draft(self, existing: Option<&Note>) -> NoteDraft {
        let tags = self
            .tags
            .or_else(|| existing.map(|n| n.tags.clone()))
            .unwrap_or_default();
        NoteDraft {
            title: self
                .title
                .or_else(|| existing.map(|n| n.title.clone()))
                .unwrap_or_default(),
            body: self
                .body
                .or_else(|| existing.map(|n| n.body.clone()))
                .unwrap_or_default(),
            status: self
                .status
                .or_else(|| existing.map(|n| n.status.clone()))
                .unwrap_or_else(|| DEFAULT_STATUS.to_string()),
            tags: normalize_tags(tags),
        }
    }
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Additional data for note responses: `latest_synced_at` and `count`.
#[derive(Debug, Clone, Copy)]
pub struct NotesSummary {
    clock: SyncClock,
}

impl NotesSummary {
    /// Create a provider that encodes times with `clock`.
    pub fn new(clock: SyncClock) -> Self {
        Self { clock }
    }
}

impl AdditionalData<Note> for NotesSummary {
    fn additional_data(&self, records: &[Note]) -> Map<String, Value> {
        let latest = records
            .iter()
            .map(|n| n.updated_at)
            .max()
            .map(|at| Value::from(self.clock.to_synced_at(at).value()))
            .unwrap_or(Value::Null);

        let mut map = Map::new();
        map.insert("latest_synced_at".to_string(), latest);
        map.insert("count".to_string(), Value::from(records.len()));
        map
    }
}
