//! Identity and timestamp types for synced resources.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The primary key of a synced record.
///
/// Ids are opaque to the sync protocol: they only need to be comparable
/// and hashable. Integer keys are the common case; text keys cover
/// stores keyed by slugs or UUIDs.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    /// Integer primary key.
    Int(i64),
    /// Text primary key.
    Text(String),
}

impl RecordId {
    /// Parse an id received as text.
    ///
    /// Numeric strings become [`RecordId::Int`] so that keys of a JSON
    /// object (always strings on the wire) line up with integer keys.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<i64>() {
            Ok(value) => Self::Int(value),
            Err(_) => Self::Text(trimmed.to_string()),
        }
    }

    /// Get the integer value, if this is an integer id.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Text(_) => None,
        }
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{}", value),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self)
    }
}

/// A point in time as exchanged with clients.
///
/// Milliseconds since the configured `base_time`, not since the Unix
/// epoch. Shifting the origin keeps the numbers small on the wire and
/// lets a deployment invalidate every client cache by moving the epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct SyncedAt(i64);

impl SyncedAt {
    /// Create a new SyncedAt with the given value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the numeric value of this SyncedAt.
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for SyncedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SyncedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyncedAt({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_text_parses_as_int() {
        assert_eq!(RecordId::parse("42"), RecordId::Int(42));
        assert_eq!(RecordId::parse(" 7 "), RecordId::Int(7));
        assert_eq!(RecordId::parse("-3"), RecordId::Int(-3));
    }

    #[test]
    fn non_numeric_text_stays_text() {
        assert_eq!(RecordId::parse("abc"), RecordId::Text("abc".into()));
        assert_eq!(RecordId::parse("1.5"), RecordId::Text("1.5".into()));
    }

    #[test]
    fn record_id_serializes_untagged() {
        let json = serde_json::to_string(&vec![RecordId::Int(1), RecordId::from("x")]).unwrap();
        assert_eq!(json, r#"[1,"x"]"#);
    }

    #[test]
    fn record_id_display() {
        assert_eq!(RecordId::Int(11).to_string(), "11");
        assert_eq!(RecordId::from("slug").to_string(), "slug");
    }

    #[test]
    fn synced_at_is_transparent_on_the_wire() {
        let json = serde_json::to_string(&SyncedAt::new(1234)).unwrap();
        assert_eq!(json, "1234");
        let back: SyncedAt = serde_json::from_str("1234").unwrap();
        assert_eq!(back, SyncedAt::new(1234));
    }

    #[test]
    fn synced_at_orders_by_value() {
        assert!(SyncedAt::new(1) < SyncedAt::new(2));
        assert_eq!(SyncedAt::default().value(), 0);
    }
}
