//! View parameter handling.
//!
//! A [`ViewState`] is the validated form of the presentation parameters
//! of one request: pagination window, ordering, filters and the raw sync
//! token. Every parameter with an allow-list in the resource's
//! [`ViewConfig`] is checked against it; rejected values fall back to the
//! configured default. Nothing in here returns an error for bad input.
//!
//! ```text
//! defaults ──merge──► params ──merge (allow-list checked)──► ViewState
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use sync_types::{ParamValue, RecordId};
use thiserror::Error;

/// Page length used when neither the request nor the config gives one.
pub const DEFAULT_LENGTH: u64 = 5;

/// Parameters added by the routing layer, never part of the view.
const FRAMING_KEYS: [&str; 2] = ["action", "controller"];

/// Per-resource allow-lists and defaults.
///
/// Each section replaces the base table wholesale: a config that only
/// lists `allowed` keeps the base `defaults`, and vice versa.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Legal values per parameter.
    pub allowed: BTreeMap<String, Vec<String>>,
    /// Default value per parameter.
    #[serde(alias = "default")]
    pub defaults: BTreeMap<String, String>,
}

impl ViewConfig {
    /// Replace the allow-list section.
    pub fn with_allowed<K, V>(mut self, allowed: impl IntoIterator<Item = (K, Vec<V>)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.allowed = allowed
            .into_iter()
            .map(|(k, vs)| (k.into(), vs.into_iter().map(Into::into).collect()))
            .collect();
        self
    }

    /// Replace the defaults section.
    pub fn with_defaults<K, V>(mut self, defaults: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.defaults = defaults
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Check the table for contradictions.
    ///
    /// Run once at startup; a config that passes guarantees every
    /// resolved value of an allow-listed parameter is a member of its
    /// allow-list.
    pub fn validate(&self) -> Result<(), ViewConfigError> {
        for (field, values) in &self.allowed {
            if values.is_empty() {
                return Err(ViewConfigError::EmptyAllowList {
                    field: field.clone(),
                });
            }
        }

        for (field, value) in &self.defaults {
            if let Some(values) = self.allowed.get(field) {
                if !values.contains(value) {
                    return Err(ViewConfigError::DefaultNotAllowed {
                        field: field.clone(),
                        value: value.clone(),
                    });
                }
            }
        }

        if let Some(length) = self.defaults.get("length") {
            if positive_int(length).is_none() {
                return Err(ViewConfigError::InvalidLength {
                    value: length.clone(),
                });
            }
        }

        Ok(())
    }

    fn permits(&self, field: &str, value: &ParamValue) -> bool {
        match self.allowed.get(field) {
            None => true,
            Some(values) => value
                .as_str()
                .map(|v| values.iter().any(|allowed| allowed == v))
                .unwrap_or(false),
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            allowed: BTreeMap::from([("view".to_string(), vec!["list".to_string()])]),
            defaults: BTreeMap::from([
                ("view".to_string(), "list".to_string()),
                ("entry_name".to_string(), "item".to_string()),
            ]),
        }
    }
}

/// Contradictions found by [`ViewConfig::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewConfigError {
    /// A parameter has an allow-list with no entries.
    #[error("allow-list for {field} is empty")]
    EmptyAllowList {
        /// The parameter name.
        field: String,
    },

    /// A default is not a member of its own allow-list.
    #[error("default {value:?} for {field} is not in its allow-list")]
    DefaultNotAllowed {
        /// The parameter name.
        field: String,
        /// The rejected default.
        value: String,
    },

    /// The default page length is not a positive integer.
    #[error("default length {value:?} is not a positive integer")]
    InvalidLength {
        /// The rejected default.
        value: String,
    },
}

/// Ordering direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Lowest first.
    Asc,
    /// Highest first.
    Desc,
}

impl Direction {
    /// Parse `asc` / `desc`, ignoring case.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    /// The wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The validated view parameters of one request.
#[derive(Debug, Clone)]
pub struct ViewState {
    params: BTreeMap<String, ParamValue>,
    config: Arc<ViewConfig>,
}

impl ViewState {
    /// Build the view from raw request parameters.
    pub fn build<K>(raw: impl IntoIterator<Item = (K, ParamValue)>, config: Arc<ViewConfig>) -> Self
    where
        K: Into<String>,
    {
        let mut params: BTreeMap<String, ParamValue> = config
            .defaults
            .iter()
            .map(|(k, v)| (k.clone(), ParamValue::Single(v.clone())))
            .collect();

        for (key, value) in raw {
            let key = key.into();
            if config.permits(&key, &value) {
                params.insert(key, value);
            } else {
                tracing::debug!(param = %key, "view parameter not in allow-list, keeping default");
            }
        }

        params.retain(|key, _| !FRAMING_KEYS.contains(&key.as_str()));

        Self { params, config }
    }

    /// A view with only the base defaults.
    pub fn empty() -> Self {
        Self::build(Vec::<(String, ParamValue)>::new(), Arc::new(ViewConfig::default()))
    }

    /// All resolved parameters.
    pub fn params(&self) -> &BTreeMap<String, ParamValue> {
        &self.params
    }

    /// A resolved parameter as a single string.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(ParamValue::as_str)
    }

    /// The configured allow-lists.
    pub fn allowed(&self) -> &BTreeMap<String, Vec<String>> {
        &self.config.allowed
    }

    /// The current view name.
    pub fn current(&self) -> String {
        match self.params.get("view") {
            Some(ParamValue::Single(value)) => value.clone(),
            Some(ParamValue::List(values)) => values.concat(),
            _ => String::new(),
        }
    }

    /// Whether `view` is the current view.
    pub fn is_current(&self, view: &str) -> bool {
        self.current() == view
    }

    /// All allowed view names.
    pub fn all(&self) -> &[String] {
        self.config
            .allowed
            .get("view")
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Page number (1-based).
    pub fn page(&self) -> u64 {
        self.get("page")
            .and_then(positive_int)
            .or_else(|| self.config.defaults.get("page").and_then(|p| positive_int(p)))
            .unwrap_or(1)
    }

    /// Offset of the first record of the page.
    pub fn start(&self) -> u64 {
        self.get("start").and_then(positive_int).unwrap_or(0)
    }

    /// Maximum number of records in the page. Never zero.
    pub fn length(&self) -> u64 {
        self.get("length")
            .and_then(positive_int)
            .or_else(|| self.config.defaults.get("length").and_then(|l| positive_int(l)))
            .unwrap_or(DEFAULT_LENGTH)
    }

    /// Field to order by.
    pub fn order_by(&self) -> Option<&str> {
        self.get("order_by")
    }

    /// Field to group by.
    pub fn group_by(&self) -> Option<&str> {
        self.get("group_by")
    }

    /// Ordering direction, if a recognised one was given.
    pub fn direction(&self) -> Option<Direction> {
        self.get("direction").and_then(Direction::parse)
    }

    /// Free-form filter criteria.
    pub fn filter(&self) -> Option<&BTreeMap<String, ParamValue>> {
        self.params.get("filter").and_then(ParamValue::as_map)
    }

    /// Tag filter, passed through to the store.
    pub fn tags_filter(&self) -> Option<&ParamValue> {
        self.params.get("tags_filter")
    }

    /// Whether a non-blank tag filter is present.
    pub fn tags_applied(&self) -> bool {
        self.tags_filter().is_some_and(|tags| !tags.is_blank())
    }

    /// Explicit id pre-filter from a comma-separated `ids` parameter.
    pub fn ids(&self) -> Option<Vec<RecordId>> {
        let raw = self.params.get("ids")?;
        let ids = raw
            .values()
            .into_iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(RecordId::parse)
            .collect();
        Some(ids)
    }

    /// The raw sync token (`s`), if one was sent.
    pub fn sync_token(&self) -> Option<&str> {
        self.get("s")
    }

    /// Human name for one record, used by pagination labels.
    pub fn entry_name(&self) -> &str {
        self.get("entry_name").unwrap_or("item")
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self::empty()
    }
}

/// Parse the leading integer of `raw` and keep it only if positive.
///
/// A leading `+` is accepted and trailing garbage is ignored (`"10abc"`
/// is 10); anything without a leading integer, zero or a negative number
/// yields `None`.
fn positive_int(raw: &str) -> Option<u64> {
    let trimmed = raw.trim_start();
    let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let digits: &str = {
        let end = trimmed
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map(|(idx, _)| idx)
            .unwrap_or(trimmed.len());
        &trimmed[..end]
    };
    digits.parse::<u64>().ok().filter(|v| *v > 0)
}
