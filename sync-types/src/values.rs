//! Scalar values flowing between requests, scopes and stores.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A request parameter value.
///
/// Query strings carry plain strings, repeated keys carry lists, and
/// bracketed keys (`filter[status]=open`) carry nested maps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// A single value.
    Single(String),
    /// A repeated value.
    List(Vec<String>),
    /// A nested map of values.
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    /// Get the value as a string, if it is a single value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Single(value) => Some(value),
            _ => None,
        }
    }

    /// Get the nested map, if this is a map value.
    pub fn as_map(&self) -> Option<&BTreeMap<String, ParamValue>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// All scalar values held directly by this parameter.
    ///
    /// A single value yields one item, a list yields its items and a map
    /// yields nothing.
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Single(value) => vec![value.as_str()],
            Self::List(values) => values.iter().map(String::as_str).collect(),
            Self::Map(_) => Vec::new(),
        }
    }

    /// Whether the value carries nothing useful.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Single(value) => value.trim().is_empty(),
            Self::List(values) => values.iter().all(|v| v.trim().is_empty()),
            Self::Map(map) => map.is_empty(),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

/// A typed column value read from a record.
///
/// Used for filtering and ordering. Values of different kinds order by
/// kind first, so mixed columns still sort deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldValue {
    /// Missing value.
    Null,
    /// Boolean column.
    Bool(bool),
    /// Integer column.
    Int(i64),
    /// Text column.
    Text(String),
    /// Timestamp column.
    Time(DateTime<Utc>),
}

impl FieldValue {
    /// Whether this value equals the textual filter value `raw`.
    pub fn matches(&self, raw: &str) -> bool {
        let raw = raw.trim();
        match self {
            Self::Null => raw.is_empty() || raw.eq_ignore_ascii_case("null"),
            Self::Bool(value) => match raw {
                "true" | "1" => *value,
                "false" | "0" => !*value,
                _ => false,
            },
            Self::Int(value) => raw.parse::<i64>().map(|r| r == *value).unwrap_or(false),
            Self::Text(value) => value == raw,
            Self::Time(value) => parse_time(raw).map(|t| t == *value).unwrap_or(false),
        }
    }
}

/// Parse an RFC 3339 string or integer Unix milliseconds.
fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(millis) = raw.parse::<i64>() {
        return Utc.timestamp_millis_opt(millis).single();
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
