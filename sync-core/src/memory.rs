//! In-memory collection.
//!
//! Evaluates [`Scope`]s over a `Vec` of records. Used by tests and by
//! embedders whose records already live in memory.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use sync_types::RecordId;

use crate::collection::{Collection, CollectionError, Record, ResourceDescriptor};
use crate::scope::Scope;
use crate::view::Direction;

/// A collection backed by a `Vec`.
#[derive(Debug, Clone)]
pub struct MemoryCollection<R> {
    descriptor: ResourceDescriptor,
    records: Vec<R>,
}

impl<R: Record> MemoryCollection<R> {
    /// Create a collection from records.
    pub fn new(descriptor: ResourceDescriptor, records: Vec<R>) -> Self {
        Self {
            descriptor,
            records,
        }
    }

    /// Append a record.
    pub fn push(&mut self, record: R) {
        self.records.push(record);
    }

    /// All records, in insertion order.
    pub fn records(&self) -> &[R] {
        &self.records
    }

    /// Consume the collection, returning its records.
    pub fn into_records(self) -> Vec<R> {
        self.records
    }

    fn evaluate(&self, scope: &Scope) -> Vec<&R> {
        let ids: Option<HashSet<&RecordId>> = scope.ids.as_ref().map(|ids| ids.iter().collect());

        let mut matched: Vec<&R> = self
            .records
            .iter()
            .filter(|r| ids.as_ref().map_or(true, |ids| ids.contains(&r.id())))
            .filter(|r| self.matches_filter(r, scope))
            .filter(|r| matches_tags(*r, &scope.tags))
            .filter(|r| {
                scope
                    .delta
                    .as_ref()
                    .map_or(true, |delta| delta.admits(&r.id(), r.updated_at()))
            })
            .collect();

        if let Some(within) = &scope.within {
            let position: HashMap<&RecordId, usize> = within
                .iter()
                .enumerate()
                .rev()
                .map(|(idx, id)| (id, idx))
                .collect();
            matched.retain(|r| position.contains_key(&r.id()));
            matched.sort_by_key(|r| position[&r.id()]);
        } else {
            self.sort(&mut matched, scope);
        }

        if let Some(range) = scope.range {
            matched = matched
                .into_iter()
                .skip(range.offset as usize)
                .take(range.limit as usize)
                .collect();
        }

        matched
    }

    fn matches_filter(&self, record: &R, scope: &Scope) -> bool {
        scope.filter.iter().all(|(column, values)| {
            if !self.descriptor.is_column(column) {
                return true;
            }
            match record.field(column) {
                Some(value) => values.iter().any(|v| value.matches(v)),
                None => false,
            }
        })
    }

    fn sort(&self, records: &mut [&R], scope: &Scope) {
        let order = scope
            .order
            .as_ref()
            .filter(|order| self.descriptor.is_orderable(order));

        records.sort_by(|a, b| {
            let primary = match order {
                Some(order) => {
                    let cmp = a.field(&order.field).cmp(&b.field(&order.field));
                    match order.direction {
                        Direction::Asc => cmp,
                        Direction::Desc => cmp.reverse(),
                    }
                }
                None => Ordering::Equal,
            };
            primary.then_with(|| a.id().cmp(&b.id()))
        });
    }
}

fn matches_tags<R: Record>(record: &R, tags: &[String]) -> bool {
    if tags.is_empty() {
        return true;
    }
    let held = record.tags();
    tags.iter().all(|tag| held.contains(tag))
}

#[async_trait]
impl<R: Record> Collection for MemoryCollection<R> {
    type Record = R;

    fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    async fn count(&self, scope: &Scope) -> Result<u64, CollectionError> {
        let distinct: HashSet<RecordId> = self.evaluate(scope).iter().map(|r| r.id()).collect();
        Ok(distinct.len() as u64)
    }

    async fn pluck_ids(&self, scope: &Scope) -> Result<Vec<RecordId>, CollectionError> {
        Ok(self.evaluate(scope).iter().map(|r| r.id()).collect())
    }

    async fn fetch(&self, scope: &Scope) -> Result<Vec<R>, CollectionError> {
        Ok(self.evaluate(scope).into_iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{Order, Range};
    use serde::Serialize;
    use std::collections::BTreeMap;
    use sync_types::FieldValue;

    #[derive(Debug, Clone, Serialize)]
    struct Task {
        id: i64,
        title: String,
        status: String,
        tags: Vec<String>,
    }

    impl Record for Task {
        fn id(&self) -> RecordId {
            RecordId::Int(self.id)
        }

        fn field(&self, name: &str) -> Option<FieldValue> {
            match name {
                "id" => Some(FieldValue::Int(self.id)),
                "title" => Some(FieldValue::Text(self.title.clone())),
                "status" => Some(FieldValue::Text(self.status.clone())),
                _ => None,
            }
        }

        fn tags(&self) -> Vec<String> {
            self.tags.clone()
        }
    }

    fn task(id: i64, title: &str, status: &str, tags: &[&str]) -> Task {
        Task {
            id,
            title: title.into(),
            status: status.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn tasks() -> MemoryCollection<Task> {
        MemoryCollection::new(
            ResourceDescriptor::new("task")
                .without_update_timestamp()
                .with_columns(["title", "status"]),
            vec![
                task(3, "c", "open", &["red"]),
                task(1, "b", "done", &["red", "blue"]),
                task(2, "a", "open", &[]),
                task(4, "a", "open", &["blue"]),
            ],
        )
    }

    fn ids(records: Vec<Task>) -> Vec<i64> {
        records.into_iter().map(|t| t.id).collect()
    }

    #[tokio::test]
    async fn unordered_scope_sorts_by_primary_key() {
        let c = tasks();
        assert_eq!(ids(c.fetch(&Scope::all()).await.unwrap()), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn order_uses_primary_key_tie_breaker() {
        let c = tasks();
        let scope = Scope {
            order: Some(Order {
                field: "title".into(),
                direction: Direction::Asc,
            }),
            ..Scope::default()
        };
        assert_eq!(ids(c.fetch(&scope).await.unwrap()), vec![2, 4, 1, 3]);

        let scope = Scope {
            order: Some(Order {
                field: "title".into(),
                direction: Direction::Desc,
            }),
            ..Scope::default()
        };
        assert_eq!(ids(c.fetch(&scope).await.unwrap()), vec![3, 1, 2, 4]);
    }

    #[tokio::test]
    async fn unknown_order_column_falls_back_to_primary_key() {
        let c = tasks();
        let scope = Scope {
            order: Some(Order {
                field: "secret".into(),
                direction: Direction::Desc,
            }),
            ..Scope::default()
        };
        assert_eq!(ids(c.fetch(&scope).await.unwrap()), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn filter_and_tags_narrow() {
        let c = tasks();
        let scope = Scope {
            filter: BTreeMap::from([("status".to_string(), vec!["open".to_string()])]),
            tags: vec!["blue".into()],
            ..Scope::default()
        };
        assert_eq!(ids(c.fetch(&scope).await.unwrap()), vec![4]);
    }

    #[tokio::test]
    async fn unknown_filter_column_is_ignored() {
        let c = tasks();
        let scope = Scope {
            filter: BTreeMap::from([("nope".to_string(), vec!["x".to_string()])]),
            ..Scope::default()
        };
        assert_eq!(c.count(&scope).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn range_windows_after_ordering() {
        let c = tasks();
        let scope = Scope {
            range: Some(Range { offset: 1, limit: 2 }),
            ..Scope::default()
        };
        assert_eq!(ids(c.fetch(&scope).await.unwrap()), vec![2, 3]);
        assert_eq!(c.count(&scope).await.unwrap(), 2);
        assert_eq!(c.count(&scope.unranged()).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn within_keeps_given_order() {
        let c = tasks();
        let scope = Scope::all().within(vec![RecordId::Int(4), RecordId::Int(9), RecordId::Int(1)]);
        assert_eq!(ids(c.fetch(&scope).await.unwrap()), vec![4, 1]);
    }

    #[tokio::test]
    async fn ids_restrict_without_reordering() {
        let c = tasks();
        let scope = Scope {
            ids: Some(vec![RecordId::Int(3), RecordId::Int(1)]),
            ..Scope::default()
        };
        assert_eq!(ids(c.fetch(&scope).await.unwrap()), vec![1, 3]);
    }

    #[tokio::test]
    async fn find_by_id() {
        let c = tasks();
        assert_eq!(c.find(&RecordId::Int(2)).await.unwrap().unwrap().title, "a");
        assert!(c.find(&RecordId::Int(99)).await.unwrap().is_none());
    }
}
