//! The query capabilities the sync pipeline needs from a data store.
//!
//! The pipeline never talks to a database directly. It asks a
//! [`Collection`] to count, pluck ids from, or fetch the records matching
//! a [`Scope`]. A store may be hit several times per request (count,
//! page ids, delta fetch) without snapshot isolation; if it changes in
//! between, `total` and `objects` can disagree for that one response.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sync_types::{FieldValue, RecordId};
use thiserror::Error;

use crate::scope::{Order, Scope};

/// A domain record served by a synced collection.
pub trait Record: Serialize + Clone + Send + Sync + 'static {
    /// Primary key.
    fn id(&self) -> RecordId;

    /// Last modification time, if the resource tracks one.
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Value of a named column, for filtering and ordering.
    fn field(&self, _name: &str) -> Option<FieldValue> {
        None
    }

    /// Tags attached to the record.
    fn tags(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Naming and introspection data for one resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    primary_key: String,
    singular: String,
    plural: String,
    update_timestamp: Option<String>,
    columns: Vec<String>,
}

impl ResourceDescriptor {
    /// Describe a resource by its singular name.
    ///
    /// Defaults: primary key `id`, update timestamp `updated_at`, plural
    /// formed by English suffix rules.
    pub fn new(singular: impl Into<String>) -> Self {
        let singular = singular.into();
        Self {
            primary_key: "id".to_string(),
            plural: pluralize(&singular),
            singular,
            update_timestamp: Some("updated_at".to_string()),
            columns: Vec::new(),
        }
    }

    /// Override the plural name.
    pub fn with_plural(mut self, plural: impl Into<String>) -> Self {
        self.plural = plural.into();
        self
    }

    /// Override the primary key column.
    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    /// Set the update timestamp column.
    pub fn with_update_timestamp(mut self, column: impl Into<String>) -> Self {
        self.update_timestamp = Some(column.into());
        self
    }

    /// Mark the resource as having no update timestamp.
    ///
    /// Delta filtering is skipped for such resources.
    pub fn without_update_timestamp(mut self) -> Self {
        self.update_timestamp = None;
        self
    }

    /// Declare the columns usable in filters and ordering.
    pub fn with_columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Primary key column.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Singular resource name (key for single-record responses).
    pub fn singular(&self) -> &str {
        &self.singular
    }

    /// Plural resource name (key for unranged collection responses).
    pub fn plural(&self) -> &str {
        &self.plural
    }

    /// Update timestamp column, if any.
    pub fn update_timestamp(&self) -> Option<&str> {
        self.update_timestamp.as_deref()
    }

    /// Whether delta filtering applies to this resource.
    pub fn has_update_timestamp(&self) -> bool {
        self.update_timestamp.is_some()
    }

    /// Whether `name` is a known column.
    pub fn is_column(&self, name: &str) -> bool {
        name == self.primary_key
            || self.update_timestamp.as_deref() == Some(name)
            || self.columns.iter().any(|c| c == name)
    }

    /// Whether a store should honour `order`.
    pub fn is_orderable(&self, order: &Order) -> bool {
        self.is_column(&order.field)
    }
}

/// Store failures. Always fatal for the request.
#[derive(Debug, Error)]
pub enum CollectionError {
    /// The backing store failed.
    #[error("store error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A stored row could not be turned into a record.
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

impl CollectionError {
    /// Wrap a backend error.
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }
}

/// A queryable, filterable, orderable set of records.
#[async_trait]
pub trait Collection: Send + Sync {
    /// The record type.
    type Record: Record;

    /// Naming and introspection data.
    fn descriptor(&self) -> &ResourceDescriptor;

    /// Number of distinct records matching `scope`.
    async fn count(&self, scope: &Scope) -> Result<u64, CollectionError>;

    /// Ids of the records matching `scope`, in scope order.
    ///
    /// May contain duplicates when the store fans out over joins.
    async fn pluck_ids(&self, scope: &Scope) -> Result<Vec<RecordId>, CollectionError>;

    /// Records matching `scope`, in scope order.
    async fn fetch(&self, scope: &Scope) -> Result<Vec<Self::Record>, CollectionError>;

    /// A single record by id.
    async fn find(&self, id: &RecordId) -> Result<Option<Self::Record>, CollectionError> {
        let scope = Scope::all().within(vec![id.clone()]);
        Ok(self.fetch(&scope).await?.into_iter().next())
    }
}

/// A collection paired with a scope: a lazily evaluated record set.
pub struct Relation<'a, C: Collection + ?Sized> {
    collection: &'a C,
    scope: Scope,
}

impl<'a, C: Collection + ?Sized> Relation<'a, C> {
    /// Every record of `collection`.
    pub fn new(collection: &'a C) -> Self {
        Self::with_scope(collection, Scope::all())
    }

    /// The records of `collection` matching `scope`.
    pub fn with_scope(collection: &'a C, scope: Scope) -> Self {
        Self { collection, scope }
    }

    /// The underlying collection.
    pub fn collection(&self) -> &'a C {
        self.collection
    }

    /// The current scope.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Refine the scope.
    pub fn map_scope(self, f: impl FnOnce(Scope) -> Scope) -> Self {
        Self {
            collection: self.collection,
            scope: f(self.scope),
        }
    }

    /// Count matching records.
    pub async fn count(&self) -> Result<u64, CollectionError> {
        self.collection.count(&self.scope).await
    }

    /// Ids of matching records.
    pub async fn pluck_ids(&self) -> Result<Vec<RecordId>, CollectionError> {
        self.collection.pluck_ids(&self.scope).await
    }

    /// Load matching records.
    pub async fn load(&self) -> Result<Vec<C::Record>, CollectionError> {
        self.collection.fetch(&self.scope).await
    }
}

impl<C: Collection + ?Sized> Clone for Relation<'_, C> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection,
            scope: self.scope.clone(),
        }
    }
}

impl<C: Collection + ?Sized> std::fmt::Debug for Relation<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relation")
            .field("resource", &self.collection.descriptor().plural())
            .field("scope", &self.scope)
            .finish()
    }
}

/// English plural for resource names.
fn pluralize(singular: &str) -> String {
    let lower = singular.to_ascii_lowercase();
    if lower.ends_with('s')
        || lower.ends_with('x')
        || lower.ends_with('z')
        || lower.ends_with("ch")
        || lower.ends_with("sh")
    {
        return format!("{}es", singular);
    }
    if let Some(stem) = singular.strip_suffix('y') {
        let before = stem.chars().last();
        if before.is_some_and(|c| !"aeiouAEIOU".contains(c)) {
            return format!("{}ies", stem);
        }
    }
    format!("{}s", singular)
}
