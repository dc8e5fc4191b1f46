//! Process-wide sync settings.
//!
//! Built once at startup and shared read-only (behind an `Arc`) by every
//! composer. Nothing here changes after construction, so no locking is
//! needed across concurrent requests.

use std::collections::BTreeMap;
use std::sync::Arc;
use sync_types::{RecordId, SyncedAt};

use crate::clock::{SyncClock, DEFAULT_BASE_TIME};
use crate::token::{JsonTokenCodec, SyncToken, TokenCodec};

/// The epoch and token codec used for one deployment.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    clock: SyncClock,
    codec: Arc<dyn TokenCodec>,
}

impl SyncSettings {
    /// Create settings from an epoch and a codec.
    pub fn new(base_time: i64, codec: Arc<dyn TokenCodec>) -> Self {
        Self {
            clock: SyncClock::new(base_time),
            codec,
        }
    }

    /// The timestamp codec.
    pub fn clock(&self) -> &SyncClock {
        &self.clock
    }

    /// The sync token codec.
    pub fn codec(&self) -> &dyn TokenCodec {
        self.codec.as_ref()
    }

    /// Decode a raw `s` parameter with this deployment's epoch.
    pub fn decode_token(&self, encoded: &str) -> SyncToken {
        self.codec.decode(encoded, self.clock.base_time())
    }

    /// Encode a client-side map (mainly for clients and tests).
    pub fn encode_token(&self, synced: &BTreeMap<RecordId, SyncedAt>) -> String {
        self.codec.encode(synced)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_TIME, Arc::new(JsonTokenCodec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::UrlSafeTokenCodec;

    #[test]
    fn default_settings_use_json_and_2017_epoch() {
        let settings = SyncSettings::default();
        assert_eq!(settings.clock().base_time(), DEFAULT_BASE_TIME);
        assert_eq!(settings.codec().name(), "json");
    }

    #[test]
    fn decode_token_rebases_with_configured_epoch() {
        let settings = SyncSettings::new(10_000, Arc::new(UrlSafeTokenCodec));
        let mut synced = BTreeMap::new();
        synced.insert(RecordId::Int(3), SyncedAt::new(25));
        let token = settings.decode_token(&settings.encode_token(&synced));
        assert_eq!(token.get(&RecordId::Int(3)), Some(10_025));
    }
}
