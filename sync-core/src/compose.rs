//! Response composition.
//!
//! The composer turns a record, a list of records, or a queryable
//! relation into the payload handed to the HTTP boundary. It runs a fixed
//! table of steps in order:
//!
//! ```text
//! ranged   (sync token present):
//!     requested_at → range_total → indices → rejected_ids → ranged_outer_layer → additional_data
//! unranged (no sync token):
//!     outer_layer → additional_data
//! ```
//!
//! `total` and `indices` describe the requested page window before delta
//! filtering; `objects` holds only the records of that window the client
//! does not already have up to date.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::sync::Arc;
use sync_types::{IndexMap, SyncedAt};
use thiserror::Error;

use crate::collection::{Collection, CollectionError, Record, Relation, ResourceDescriptor};
use crate::delta;
use crate::scope::Scope;
use crate::settings::SyncSettings;
use crate::view::ViewState;

/// Keys written by the composer itself.
const RESERVED_KEYS: [&str; 4] = ["requested_at", "total", "indices", "objects"];

/// A relation over any collection of `R`.
pub type DynRelation<'a, R> = Relation<'a, dyn Collection<Record = R> + 'a>;

/// Extra top-level entries merged into a response on request.
pub trait AdditionalData<R>: Send + Sync {
    /// Entries to merge, computed from the records being returned.
    ///
    /// A single record is passed as a one-element slice.
    fn additional_data(&self, records: &[R]) -> Map<String, Value>;
}

/// What to compose a response from.
pub enum Subject<'a, R: Record> {
    /// A single record.
    One(R),
    /// An already loaded list.
    Many(Vec<R>),
    /// A lazily evaluated relation.
    Relation(DynRelation<'a, R>),
}

impl<'a, R: Record> Subject<'a, R> {
    /// A relation over `collection` restricted by `scope`.
    pub fn relation<C>(collection: &'a C, scope: Scope) -> Self
    where
        C: Collection<Record = R> + 'a,
    {
        let collection: &'a (dyn Collection<Record = R> + 'a) = collection;
        Self::Relation(Relation::with_scope(collection, scope))
    }

    /// Every record of `collection`.
    pub fn all<C>(collection: &'a C) -> Self
    where
        C: Collection<Record = R> + 'a,
    {
        Self::relation(collection, Scope::all())
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeOptions {
    /// Raw sync token. Its presence (even empty) selects the ranged shape.
    pub sync_token: Option<String>,
    /// Key for single-record responses instead of the singular name.
    pub top_level_key: Option<String>,
    /// Whether to merge the additional-data hook's entries.
    pub additional_data: bool,
}

impl ComposeOptions {
    /// Options carrying the view's sync token.
    pub fn from_view(view: &ViewState) -> Self {
        Self {
            sync_token: view.sync_token().map(str::to_string),
            ..Self::default()
        }
    }

    /// Set the top-level key for single-record responses.
    pub fn with_top_level_key(mut self, key: impl Into<String>) -> Self {
        self.top_level_key = Some(key.into());
        self
    }

    /// Opt in to additional data.
    pub fn with_additional_data(mut self, enabled: bool) -> Self {
        self.additional_data = enabled;
        self
    }

    /// Whether the ranged shape applies.
    pub fn is_ranged(&self) -> bool {
        self.sync_token.is_some()
    }
}

/// One composition step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeStep {
    /// Stamp `requested_at` with the current server time.
    RequestedAt,
    /// Count `total`, then order and window the relation.
    RangeTotal,
    /// Build `indices` over the windowed relation.
    Indices,
    /// Drop records the client already holds up to date.
    RejectedIds,
    /// Load the remaining records under `objects`.
    RangedOuterLayer,
    /// Wrap records under the resource key.
    OuterLayer,
    /// Merge the additional-data hook's entries.
    AdditionalData,
}

impl ComposeStep {
    /// Step name, as used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestedAt => "requested_at",
            Self::RangeTotal => "range_total",
            Self::Indices => "indices",
            Self::RejectedIds => "rejected_ids",
            Self::RangedOuterLayer => "ranged_outer_layer",
            Self::OuterLayer => "outer_layer",
            Self::AdditionalData => "additional_data",
        }
    }
}

/// Steps for sync-aware collection responses.
pub const RANGED_STEPS: [ComposeStep; 6] = [
    ComposeStep::RequestedAt,
    ComposeStep::RangeTotal,
    ComposeStep::Indices,
    ComposeStep::RejectedIds,
    ComposeStep::RangedOuterLayer,
    ComposeStep::AdditionalData,
];

/// Steps for single records and bare collections.
pub const UNRANGED_STEPS: [ComposeStep; 2] = [ComposeStep::OuterLayer, ComposeStep::AdditionalData];

/// Composition failures. All of them are fatal for the request.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// The store failed.
    #[error(transparent)]
    Collection(#[from] CollectionError),

    /// A ranged response was requested for something that is not a relation.
    #[error("ranged responses need a queryable collection")]
    NotRangeable,

    /// The step table finished without producing a required part.
    #[error("composition finished without {0}")]
    Incomplete(&'static str),
}

/// The body of a composed response.
#[derive(Debug, Clone, PartialEq)]
pub enum Body<R> {
    /// A sync-aware page.
    Ranged {
        /// Server time of this response.
        requested_at: SyncedAt,
        /// Size of the filtered collection before windowing.
        total: u64,
        /// Ordinal to id over the page window.
        indices: IndexMap,
        /// Records of the window the client needs.
        objects: Vec<R>,
    },
    /// A bare collection under the plural resource name.
    Collection {
        /// The plural resource name.
        key: String,
        /// All records.
        records: Vec<R>,
    },
    /// A single record under the singular name or an override key.
    Single {
        /// The top-level key.
        key: String,
        /// The record.
        record: R,
    },
}

/// A composed response, ready for serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponsePayload<R> {
    body: Body<R>,
    additional: Map<String, Value>,
}

impl<R> ResponsePayload<R> {
    /// The body.
    pub fn body(&self) -> &Body<R> {
        &self.body
    }

    /// Merged additional entries.
    pub fn additional(&self) -> &Map<String, Value> {
        &self.additional
    }

    /// The records carried by the response, whatever its shape.
    pub fn records(&self) -> &[R] {
        match &self.body {
            Body::Ranged { objects, .. } => objects,
            Body::Collection { records, .. } => records,
            Body::Single { record, .. } => std::slice::from_ref(record),
        }
    }

    /// `total`, for ranged responses.
    pub fn total(&self) -> Option<u64> {
        match &self.body {
            Body::Ranged { total, .. } => Some(*total),
            _ => None,
        }
    }

    /// `indices`, for ranged responses.
    pub fn indices(&self) -> Option<&IndexMap> {
        match &self.body {
            Body::Ranged { indices, .. } => Some(indices),
            _ => None,
        }
    }

    /// `requested_at`, for ranged responses.
    pub fn requested_at(&self) -> Option<SyncedAt> {
        match &self.body {
            Body::Ranged { requested_at, .. } => Some(*requested_at),
            _ => None,
        }
    }
}

impl<R: Serialize> Serialize for ResponsePayload<R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match &self.body {
            Body::Ranged {
                requested_at,
                total,
                indices,
                objects,
            } => {
                self.entry(&mut map, "requested_at", requested_at)?;
                self.entry(&mut map, "total", total)?;
                self.entry(&mut map, "indices", indices)?;
                self.entry(&mut map, "objects", objects)?;
            }
            Body::Collection { key, records } => self.entry(&mut map, key, records)?,
            Body::Single { key, record } => self.entry(&mut map, key, record)?,
        }
        let own_key = match &self.body {
            Body::Ranged { .. } => None,
            Body::Collection { key, .. } | Body::Single { key, .. } => Some(key.as_str()),
        };
        for (key, value) in &self.additional {
            let written = match own_key {
                None => RESERVED_KEYS.contains(&key.as_str()),
                Some(own) => own == key,
            };
            if !written {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

impl<R> ResponsePayload<R> {
    /// Write `key`, letting an additional entry of the same name win.
    fn entry<M: SerializeMap, T: Serialize + ?Sized>(
        &self,
        map: &mut M,
        key: &str,
        value: &T,
    ) -> Result<(), M::Error> {
        match self.additional.get(key) {
            Some(replacement) => map.serialize_entry(key, replacement),
            None => map.serialize_entry(key, value),
        }
    }
}

/// Composes responses for one resource type.
pub struct Composer<R> {
    descriptor: ResourceDescriptor,
    settings: Arc<SyncSettings>,
    additional: Option<Arc<dyn AdditionalData<R>>>,
}

impl<R> std::fmt::Debug for Composer<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composer")
            .field("resource", &self.descriptor.singular())
            .field("settings", &self.settings)
            .field("additional_data", &self.additional.is_some())
            .finish()
    }
}

impl<R> Clone for Composer<R> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            settings: self.settings.clone(),
            additional: self.additional.clone(),
        }
    }
}

/// Working state threaded through the steps.
struct Composition<'a, R: Record> {
    working: Working<'a, R>,
    requested_at: Option<SyncedAt>,
    total: Option<u64>,
    indices: Option<IndexMap>,
    body: Option<Body<R>>,
    additional: Map<String, Value>,
}

enum Working<'a, R: Record> {
    One(R),
    Many(Vec<R>),
    Relation(DynRelation<'a, R>),
    Consumed,
}

impl<R: Record> Composer<R> {
    /// Create a composer for the resource described by `descriptor`.
    pub fn new(descriptor: ResourceDescriptor, settings: Arc<SyncSettings>) -> Self {
        Self {
            descriptor,
            settings,
            additional: None,
        }
    }

    /// Attach an additional-data hook.
    pub fn with_additional_data(mut self, provider: Arc<dyn AdditionalData<R>>) -> Self {
        self.additional = Some(provider);
        self
    }

    /// The resource descriptor.
    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// The sync settings.
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Compose a response.
    ///
    /// The input is never mutated; each call is a single pass over the
    /// step table selected by `options`.
    pub async fn compose(
        &self,
        subject: Subject<'_, R>,
        view: &ViewState,
        options: &ComposeOptions,
    ) -> Result<ResponsePayload<R>, ComposeError> {
        let steps: &[ComposeStep] = if options.is_ranged() {
            &RANGED_STEPS
        } else {
            &UNRANGED_STEPS
        };

        let mut state = Composition {
            working: match subject {
                Subject::One(record) => Working::One(record),
                Subject::Many(records) => Working::Many(records),
                Subject::Relation(relation) => Working::Relation(relation),
            },
            requested_at: None,
            total: None,
            indices: None,
            body: None,
            additional: Map::new(),
        };

        for step in steps {
            tracing::trace!(step = step.name(), resource = self.descriptor.plural(), "compose step");
            self.apply(*step, &mut state, view, options).await?;
        }

        let body = state.body.ok_or(ComposeError::Incomplete("body"))?;
        Ok(ResponsePayload {
            body,
            additional: state.additional,
        })
    }

    async fn apply(
        &self,
        step: ComposeStep,
        state: &mut Composition<'_, R>,
        view: &ViewState,
        options: &ComposeOptions,
    ) -> Result<(), ComposeError> {
        match step {
            ComposeStep::RequestedAt => {
                state.requested_at = Some(self.settings.clock().now_synced_at());
            }

            ComposeStep::RangeTotal => {
                let relation = take_relation(&mut state.working)?;
                state.total = Some(relation.count().await?);
                state.working =
                    Working::Relation(relation.map_scope(|scope| scope.view_order_range(view)));
            }

            ComposeStep::Indices => {
                let Working::Relation(relation) = &state.working else {
                    return Err(ComposeError::NotRangeable);
                };
                let ids = relation.pluck_ids().await?;
                state.indices = Some(IndexMap::build(view.start(), ids));
            }

            ComposeStep::RejectedIds => {
                let relation = take_relation(&mut state.working)?;
                let raw = options.sync_token.as_deref().unwrap_or_default();
                let token = self.settings.decode_token(raw);
                state.working = Working::Relation(delta::resolve(relation, Some(&token)).await?);
            }

            ComposeStep::RangedOuterLayer => {
                let relation = take_relation(&mut state.working)?;
                let objects = relation.load().await?;
                state.body = Some(Body::Ranged {
                    requested_at: state
                        .requested_at
                        .ok_or(ComposeError::Incomplete("requested_at"))?,
                    total: state.total.ok_or(ComposeError::Incomplete("total"))?,
                    indices: state
                        .indices
                        .take()
                        .ok_or(ComposeError::Incomplete("indices"))?,
                    objects,
                });
            }

            ComposeStep::OuterLayer => {
                let working = std::mem::replace(&mut state.working, Working::Consumed);
                state.body = Some(match working {
                    Working::One(record) => Body::Single {
                        key: self.single_key(options),
                        record,
                    },
                    Working::Many(records) => Body::Collection {
                        key: self.descriptor.plural().to_string(),
                        records,
                    },
                    Working::Relation(relation) => Body::Collection {
                        key: self.descriptor.plural().to_string(),
                        records: relation.load().await?,
                    },
                    Working::Consumed => return Err(ComposeError::Incomplete("records")),
                });
            }

            ComposeStep::AdditionalData => {
                if !options.additional_data {
                    return Ok(());
                }
                let Some(provider) = &self.additional else {
                    return Ok(());
                };
                let records: &[R] = match &state.body {
                    Some(Body::Ranged { objects, .. }) => objects,
                    Some(Body::Collection { records, .. }) => records,
                    Some(Body::Single { record, .. }) => std::slice::from_ref(record),
                    None => return Err(ComposeError::Incomplete("records")),
                };
                state.additional.extend(provider.additional_data(records));
            }
        }
        Ok(())
    }

    fn single_key(&self, options: &ComposeOptions) -> String {
        options
            .top_level_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .unwrap_or(self.descriptor.singular())
            .to_string()
    }
}

fn take_relation<'a, R: Record>(working: &mut Working<'a, R>) -> Result<DynRelation<'a, R>, ComposeError> {
    match std::mem::replace(working, Working::Consumed) {
        Working::Relation(relation) => Ok(relation),
        other => {
            *working = other;
            Err(ComposeError::NotRangeable)
        }
    }
}
