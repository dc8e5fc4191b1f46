//! Delta resolution: drop records the client already holds up to date.
//!
//! A record is sent when either
//! - its id is not in the client's sync token (never seen), or
//! - it was updated strictly after the time the client last saw it.
//!
//! A record updated exactly at the client's `synced_at` is considered
//! synced. The resolver only ever removes records from its input; it
//! never adds or reorders any.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use sync_types::RecordId;

use crate::collection::{Collection, CollectionError, Relation};
use crate::scope::Scope;
use crate::token::SyncToken;

/// The "unseen or updated since" predicate derived from a sync token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaFilter {
    known: BTreeMap<RecordId, DateTime<Utc>>,
}

impl DeltaFilter {
    /// Build the predicate from a decoded token.
    pub fn from_token(token: &SyncToken) -> Self {
        let known = token
            .known_ids()
            .filter_map(|id| token.instant_for(id).map(|at| (id.clone(), at)))
            .collect();
        Self { known }
    }

    /// Ids the client holds, with the instant it last saw each.
    pub fn known(&self) -> &BTreeMap<RecordId, DateTime<Utc>> {
        &self.known
    }

    /// Whether the client holds nothing.
    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Whether a record must be sent to the client.
    ///
    /// A known record without an update time is never resent.
    pub fn admits(&self, id: &RecordId, updated_at: Option<DateTime<Utc>>) -> bool {
        match self.known.get(id) {
            None => true,
            Some(synced) => updated_at.is_some_and(|updated| updated > *synced),
        }
    }
}

/// Narrow `relation` to the records the client must receive.
///
/// Returns the input unchanged when the resource has no update
/// timestamp or when there is no (or an empty) token. Otherwise the
/// result is restricted to the ids of the input, kept in input order,
/// minus those the client already holds up to date.
pub async fn resolve<'a, C>(
    relation: Relation<'a, C>,
    token: Option<&SyncToken>,
) -> Result<Relation<'a, C>, CollectionError>
where
    C: Collection + ?Sized,
{
    let descriptor = relation.collection().descriptor();
    if !descriptor.has_update_timestamp() {
        tracing::debug!(
            resource = descriptor.plural(),
            "no update timestamp, skipping delta filter"
        );
        return Ok(relation);
    }

    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return Ok(relation);
    };

    let original_ids = dedup(relation.pluck_ids().await?);
    let filter = DeltaFilter::from_token(token);

    tracing::debug!(
        resource = descriptor.plural(),
        candidates = original_ids.len(),
        known = filter.known().len(),
        "applying delta filter"
    );

    let collection = relation.collection();
    Ok(Relation::with_scope(
        collection,
        Scope::all().within(original_ids).changed_since(filter),
    ))
}

fn dedup(ids: Vec<RecordId>) -> Vec<RecordId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
