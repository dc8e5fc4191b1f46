//! Sync token encoding and decoding.
//!
//! A sync token is the client's record of what it already holds: a map
//! of record id to the `synced_at` value at which the client last
//! received that record. Clients send it as the `s` request parameter.
//!
//! Decoding never fails the request. A token that cannot be parsed is
//! treated as "the client holds nothing", which forces a full resync of
//! the requested window instead of an error response.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use sync_types::{RecordId, SyncedAt};
use thiserror::Error;

use crate::clock::instant_from_millis;

/// A decoded sync token.
///
/// Values are absolute Unix milliseconds: decoding adds `base_time` to
/// every `synced_at` the client sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncToken {
    entries: BTreeMap<RecordId, i64>,
}

impl SyncToken {
    /// Create an empty token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the client holds `id` as of `millis` (absolute).
    pub fn insert(&mut self, id: RecordId, millis: i64) {
        self.entries.insert(id, millis);
    }

    /// Absolute milliseconds at which the client last saw `id`.
    pub fn get(&self, id: &RecordId) -> Option<i64> {
        self.entries.get(id).copied()
    }

    /// Instant at which the client last saw `id`.
    pub fn instant_for(&self, id: &RecordId) -> Option<DateTime<Utc>> {
        self.get(id).and_then(instant_from_millis)
    }

    /// Ids the client already holds.
    pub fn known_ids(&self) -> impl Iterator<Item = &RecordId> + '_ {
        self.entries.keys()
    }

    /// Iterate over `(id, absolute millis)` entries.
    pub fn iter(&self) -> impl Iterator<Item = (&RecordId, i64)> + '_ {
        self.entries.iter().map(|(id, millis)| (id, *millis))
    }

    /// Number of ids in the token.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the client holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reasons a sync token failed to decode.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The token is not valid JSON.
    #[error("invalid token json: {0}")]
    Json(#[from] serde_json::Error),

    /// The token is not valid URL-safe base64.
    #[error("invalid token encoding: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// The token is valid JSON but not an object.
    #[error("token is not a map of id to synced_at")]
    NotAMap,

    /// A value is not an integer.
    #[error("synced_at for id {id} is not an integer")]
    InvalidValue {
        /// The offending id.
        id: String,
    },

    /// A value falls outside the representable time range once rebased.
    #[error("synced_at for id {id} is out of range")]
    OutOfRange {
        /// The offending id.
        id: String,
    },
}

/// A transport encoding for sync tokens.
///
/// Implementations must be pure: the same input always decodes to the
/// same token. The codec is chosen once at startup.
pub trait TokenCodec: Send + Sync + fmt::Debug {
    /// Short name used in logs and configuration.
    fn name(&self) -> &'static str;

    /// Encode a client-side map of id to `synced_at`.
    fn encode(&self, synced: &BTreeMap<RecordId, SyncedAt>) -> String;

    /// Decode a token, rebasing every value by `base_time`.
    fn try_decode(&self, encoded: &str, base_time: i64) -> Result<SyncToken, TokenError>;

    /// Decode a token, degrading to an empty token on any error.
    fn decode(&self, encoded: &str, base_time: i64) -> SyncToken {
        match self.try_decode(encoded, base_time) {
            Ok(token) => token,
            Err(err) => {
                tracing::debug!(
                    codec = self.name(),
                    error = %err,
                    "malformed sync token, treating as empty"
                );
                SyncToken::default()
            }
        }
    }
}

/// JSON object literal: `{"11": 12345, "12": 12400}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTokenCodec;

impl TokenCodec for JsonTokenCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, synced: &BTreeMap<RecordId, SyncedAt>) -> String {
        encode_json(synced)
    }

    fn try_decode(&self, encoded: &str, base_time: i64) -> Result<SyncToken, TokenError> {
        decode_json(encoded.as_bytes(), base_time)
    }
}

/// The JSON literal wrapped in URL-safe base64 without padding.
///
/// Survives query strings without percent-encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlSafeTokenCodec;

impl TokenCodec for UrlSafeTokenCodec {
    fn name(&self) -> &'static str {
        "url_safe"
    }

    fn encode(&self, synced: &BTreeMap<RecordId, SyncedAt>) -> String {
        URL_SAFE_NO_PAD.encode(encode_json(synced))
    }

    fn try_decode(&self, encoded: &str, base_time: i64) -> Result<SyncToken, TokenError> {
        let bytes = URL_SAFE_NO_PAD.decode(encoded.trim())?;
        decode_json(&bytes, base_time)
    }
}

/// Codec selection as written in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecKind {
    /// [`JsonTokenCodec`].
    #[default]
    Json,
    /// [`UrlSafeTokenCodec`].
    UrlSafe,
}

impl CodecKind {
    /// Instantiate the selected codec.
    pub fn codec(self) -> Box<dyn TokenCodec> {
        match self {
            Self::Json => Box::new(JsonTokenCodec),
            Self::UrlSafe => Box::new(UrlSafeTokenCodec),
        }
    }
}

fn encode_json(synced: &BTreeMap<RecordId, SyncedAt>) -> String {
    let map: Map<String, Value> = synced
        .iter()
        .map(|(id, synced_at)| (id.to_string(), Value::from(synced_at.value())))
        .collect();
    Value::Object(map).to_string()
}

fn decode_json(bytes: &[u8], base_time: i64) -> Result<SyncToken, TokenError> {
    let value: Value = serde_json::from_slice(bytes)?;
    let Value::Object(map) = value else {
        return Err(TokenError::NotAMap);
    };

    let mut token = SyncToken::new();
    for (key, value) in map {
        let synced_at = value
            .as_i64()
            .ok_or_else(|| TokenError::InvalidValue { id: key.clone() })?;
        let millis = synced_at
            .checked_add(base_time)
            .filter(|millis| *millis >= 0 && instant_from_millis(*millis).is_some())
            .ok_or_else(|| TokenError::OutOfRange { id: key.clone() })?;
        token.insert(RecordId::parse(&key), millis);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synced(entries: &[(i64, i64)]) -> BTreeMap<RecordId, SyncedAt> {
        entries
            .iter()
            .map(|&(id, at)| (RecordId::Int(id), SyncedAt::new(at)))
            .collect()
    }

    #[test]
    fn json_round_trip_with_zero_base() {
        let codec = JsonTokenCodec;
        let map = synced(&[(1, 100), (2, 200), (30, 0)]);
        let token = codec.decode(&codec.encode(&map), 0);
        assert_eq!(token.len(), 3);
        for (id, at) in &map {
            assert_eq!(token.get(id), Some(at.value()));
        }
    }

    #[test]
    fn url_safe_round_trip_with_zero_base() {
        let codec = UrlSafeTokenCodec;
        let map = synced(&[(7, 1234), (8, 5678)]);
        let encoded = codec.encode(&map);
        assert!(!encoded.contains('{'));
        let token = codec.decode(&encoded, 0);
        assert_eq!(token.get(&RecordId::Int(7)), Some(1234));
        assert_eq!(token.get(&RecordId::Int(8)), Some(5678));
    }

    #[test]
    fn decode_adds_base_time() {
        let token = JsonTokenCodec.decode(r#"{"11": 500}"#, 1_000);
        assert_eq!(token.get(&RecordId::Int(11)), Some(1_500));
    }

    #[test]
    fn text_keys_stay_text() {
        let token = JsonTokenCodec.decode(r#"{"abc": 5}"#, 0);
        assert_eq!(token.get(&RecordId::Text("abc".into())), Some(5));
    }

    #[test]
    fn malformed_tokens_decode_to_empty() {
        let codec = JsonTokenCodec;
        for raw in [
            "omgwtfbbq",
            "/#@$#,_T~B,0",
            "1439524794175,_T~B,",
            "1439524794175,_T~121.23!1B,0",
            "",
            "   ",
        ] {
            assert!(codec.decode(raw, 0).is_empty(), "{raw:?} should decode empty");
            assert!(codec.try_decode(raw, 0).is_err());
        }
    }

    #[test]
    fn wrong_types_decode_to_empty() {
        let codec = JsonTokenCodec;
        for raw in [
            "5",
            "[1,2,3]",
            r#""text""#,
            r#"{"1": "100"}"#,
            r#"{"1": 1.5}"#,
            r#"{"1": null}"#,
            r#"{"1": 100, "2": {}}"#,
        ] {
            assert!(codec.decode(raw, 0).is_empty(), "{raw:?} should decode empty");
        }
    }

    #[test]
    fn wrong_type_reports_offending_id() {
        let err = JsonTokenCodec.try_decode(r#"{"9": "x"}"#, 0).unwrap_err();
        assert!(matches!(err, TokenError::InvalidValue { ref id } if id == "9"));
    }

    #[test]
    fn negative_absolute_times_are_rejected() {
        assert!(JsonTokenCodec.decode(r#"{"1": -10}"#, 5).is_empty());
        assert!(!JsonTokenCodec.decode(r#"{"1": -10}"#, 10).is_empty());
    }

    #[test]
    fn overflowing_values_are_rejected() {
        let raw = format!(r#"{{"1": {}}}"#, i64::MAX);
        assert!(JsonTokenCodec.decode(&raw, 1).is_empty());
    }

    #[test]
    fn url_safe_rejects_plain_json() {
        assert!(UrlSafeTokenCodec.decode(r#"{"1": 5}"#, 0).is_empty());
    }

    #[test]
    fn empty_object_is_a_valid_empty_token() {
        let token = JsonTokenCodec.try_decode("{}", 0).unwrap();
        assert!(token.is_empty());
    }

    #[test]
    fn codec_kind_deserializes_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            codec: CodecKind,
        }
        let w: Wrapper = serde_json::from_str(r#"{"codec":"url_safe"}"#).unwrap();
        assert_eq!(w.codec, CodecKind::UrlSafe);
        assert_eq!(w.codec.codec().name(), "url_safe");
        assert_eq!(CodecKind::default().codec().name(), "json");
    }
}
