//! # sync-core
//!
//! Delta-sync logic for REST collections, independent of any web framework
//! or database.
//!
//! A client keeps a map of `record id → time it last saw the record` and
//! sends it back, encoded, as the `s` parameter. This crate decodes that
//! token, narrows the requested page of a collection to the records the
//! client lacks or holds stale, and composes the response payload.
//!
//! ## Layers
//!
//! - [`clock`] / [`token`] / [`settings`]: epoch-relative timestamps and
//!   sync token codecs
//! - [`view`]: allow-listed view parameters (paging, ordering, filters)
//! - [`scope`] / [`collection`]: what to query, and the store trait that
//!   answers it ([`memory`] is the in-process implementation)
//! - [`delta`]: the "unseen or updated since" filter
//! - [`compose`] / [`respond`]: payload assembly and status mapping
//!
//! Stores are async (see [`Collection`]); everything else is pure and
//! testable without I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod collection;
pub mod compose;
pub mod delta;
pub mod memory;
pub mod respond;
pub mod scope;
pub mod settings;
pub mod token;
pub mod view;

pub use clock::{instant_from_millis, SyncClock, DEFAULT_BASE_TIME};
pub use collection::{Collection, CollectionError, Record, Relation, ResourceDescriptor};
pub use compose::{
    AdditionalData, Body, ComposeError, ComposeOptions, ComposeStep, Composer, DynRelation,
    ResponsePayload, Subject, RANGED_STEPS, UNRANGED_STEPS,
};
pub use delta::{resolve, DeltaFilter};
pub use memory::MemoryCollection;
pub use respond::{Action, DefaultResponder, Outcome, Rendered, ResponseStrategy, Status};
pub use scope::{Order, Range, Scope};
pub use settings::SyncSettings;
pub use token::{CodecKind, JsonTokenCodec, SyncToken, TokenCodec, TokenError, UrlSafeTokenCodec};
pub use view::{Direction, ViewConfig, ViewConfigError, ViewState, DEFAULT_LENGTH};
