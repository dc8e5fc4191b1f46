//! Composable query descriptions.
//!
//! A [`Scope`] says *which* records of a collection a step wants, never
//! *how* to fetch them. Stores translate it (to SQL, or to an in-memory
//! filter). Scopes are built by chaining, mirroring the order in which a
//! request narrows its collection:
//!
//! ```text
//! Scope::all()
//!     .view_filter(&view)        ids / filter / tags_filter
//!     .view_order_range(&view)   order_by + direction, start + length
//! ```

use std::collections::BTreeMap;
use sync_types::{ParamValue, RecordId};

use crate::delta::DeltaFilter;
use crate::view::{Direction, ViewState};

/// Requested ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Column to order by.
    pub field: String,
    /// Direction.
    pub direction: Direction,
}

/// Requested window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    /// Number of records to skip.
    pub offset: u64,
    /// Maximum number of records to return.
    pub limit: u64,
}

/// A query over one collection.
///
/// Unknown filter or order columns are ignored by stores rather than
/// rejected; the primary key is always the final ordering tie-breaker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    /// Restrict to these ids (set membership, no ordering effect).
    pub ids: Option<Vec<RecordId>>,
    /// Column to accepted values; a record must match every column.
    pub filter: BTreeMap<String, Vec<String>>,
    /// Tags a record must all carry.
    pub tags: Vec<String>,
    /// Ordering.
    pub order: Option<Order>,
    /// Window.
    pub range: Option<Range>,
    /// Restrict to these ids and return them in this order.
    pub within: Option<Vec<RecordId>>,
    /// Only records the client does not hold up to date.
    pub delta: Option<DeltaFilter>,
}

impl Scope {
    /// Every record of the collection.
    pub fn all() -> Self {
        Self::default()
    }

    /// Apply the view's `ids`, `filter` and `tags_filter` parameters.
    pub fn view_filter(mut self, view: &ViewState) -> Self {
        if let Some(ids) = view.ids() {
            self.ids = Some(ids);
        }

        if let Some(filter) = view.filter() {
            for (column, value) in filter {
                let values: Vec<String> = value.values().into_iter().map(str::to_string).collect();
                if values.is_empty() {
                    tracing::debug!(column = %column, "ignoring nested filter value");
                    continue;
                }
                self.filter.insert(column.clone(), values);
            }
        }

        if view.tags_applied() {
            if let Some(tags) = view.tags_filter() {
                self.tags = split_tags(tags);
            }
        }

        self
    }

    /// Apply the view's `order_by` and `direction` parameters.
    ///
    /// A missing direction orders ascending.
    pub fn view_order(mut self, view: &ViewState) -> Self {
        self.order = view.order_by().map(|field| Order {
            field: field.to_string(),
            direction: view.direction().unwrap_or(Direction::Asc),
        });
        self
    }

    /// Apply the view's `start` and `length` parameters.
    pub fn view_range(mut self, view: &ViewState) -> Self {
        self.range = Some(Range {
            offset: view.start(),
            limit: view.length(),
        });
        self
    }

    /// [`Scope::view_order`] then [`Scope::view_range`].
    pub fn view_order_range(self, view: &ViewState) -> Self {
        self.view_order(view).view_range(view)
    }

    /// Restrict to `ids`, returned in the given order.
    pub fn within(mut self, ids: Vec<RecordId>) -> Self {
        self.within = Some(ids);
        self
    }

    /// Keep only records admitted by `delta`.
    pub fn changed_since(mut self, delta: DeltaFilter) -> Self {
        self.delta = Some(delta);
        self
    }

    /// The same scope without its window.
    pub fn unranged(&self) -> Self {
        Self {
            range: None,
            ..self.clone()
        }
    }
}

fn split_tags(tags: &ParamValue) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags.values().into_iter().flat_map(|v| v.split(',')) {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}
