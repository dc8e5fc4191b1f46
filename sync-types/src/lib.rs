//! # sync-types
//!
//! Value types for delta-synchronized REST collections.
//!
//! This crate provides the foundational types used across all synced-resources crates:
//! - [`RecordId`], [`SyncedAt`] - Identity and timestamp types
//! - [`ParamValue`], [`FieldValue`] - Request parameters and column values
//! - [`IndexMap`], [`ValidationErrors`] - Payload building blocks
//! - [`SyncError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod payload;
mod values;

pub use error::SyncError;
pub use ids::{RecordId, SyncedAt};
pub use payload::{IndexMap, ValidationErrors};
pub use values::{FieldValue, ParamValue};
