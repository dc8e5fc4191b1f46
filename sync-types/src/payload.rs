//! Payload building blocks shared by the composer and the HTTP boundary.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::RecordId;

/// Dense map from absolute ordinal position to record id.
///
/// Covers exactly one page: keys run contiguously from the page offset.
/// Serializes as a JSON object keyed by the ordinal (as a string).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexMap(BTreeMap<u64, RecordId>);

impl IndexMap {
    /// Build an index map for a page starting at `offset`.
    ///
    /// Duplicate ids (join fan-out) are collapsed before ordinals are
    /// assigned: the first occurrence wins and the order is preserved.
    pub fn build(offset: u64, ids: impl IntoIterator<Item = RecordId>) -> Self {
        let mut seen = HashSet::new();
        let entries = ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .enumerate()
            .map(|(idx, id)| (offset + idx as u64, id))
            .collect();
        Self(entries)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Id at the given ordinal.
    pub fn get(&self, ordinal: u64) -> Option<&RecordId> {
        self.0.get(&ordinal)
    }

    /// Ordinals in ascending order.
    pub fn ordinals(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.keys().copied()
    }

    /// Ids in ordinal order.
    pub fn ids(&self) -> impl Iterator<Item = &RecordId> + '_ {
        self.0.values()
    }
}

/// Per-field validation messages for a rejected mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    /// Create an empty error set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message against a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Whether no errors were recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Messages for a field.
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[i64]) -> Vec<RecordId> {
        values.iter().copied().map(RecordId::Int).collect()
    }

    #[test]
    fn index_map_starts_at_offset() {
        let map = IndexMap::build(10, ids(&[11, 12, 13]));
        assert_eq!(map.ordinals().collect::<Vec<_>>(), vec![10, 11, 12]);
        assert_eq!(map.get(10), Some(&RecordId::Int(11)));
    }

    #[test]
    fn index_map_collapses_duplicates_first_wins() {
        let map = IndexMap::build(0, ids(&[3, 1, 3, 2, 1]));
        assert_eq!(map.len(), 3);
        assert_eq!(
            map.ids().cloned().collect::<Vec<_>>(),
            ids(&[3, 1, 2])
        );
        assert_eq!(map.ordinals().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn index_map_serializes_with_string_keys() {
        let map = IndexMap::build(5, ids(&[6, 7]));
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"5":6,"6":7}"#);
    }

    #[test]
    fn validation_errors_group_by_field() {
        let mut errors = ValidationErrors::new();
        errors.add("title", "can't be blank");
        errors.add("title", "is too short");
        assert_eq!(errors.get("title").unwrap().len(), 2);
        let json = serde_json::to_string(&errors).unwrap();
        assert_eq!(json, r#"{"title":["can't be blank","is too short"]}"#);
    }
}
