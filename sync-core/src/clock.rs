//! Conversion between wall-clock time and client-facing `synced_at` values.
//!
//! Clients never see Unix timestamps. Every time handed out (and every
//! time handed back in a sync token) is milliseconds since `base_time`.
//! The same `base_time` must be used on both legs of the round trip; a
//! mismatch is not detectable here and simply shifts every comparison.

use chrono::{DateTime, TimeZone, Utc};
use sync_types::SyncedAt;

/// Default epoch: 2017-01-01T00:00:00Z in Unix milliseconds.
pub const DEFAULT_BASE_TIME: i64 = 1_483_228_800_000;

/// Converts instants to and from [`SyncedAt`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncClock {
    base_time: i64,
}

impl SyncClock {
    /// Create a clock anchored at `base_time` (Unix milliseconds).
    pub fn new(base_time: i64) -> Self {
        Self { base_time }
    }

    /// The epoch this clock is anchored at.
    pub fn base_time(&self) -> i64 {
        self.base_time
    }

    /// The current server time as a `synced_at` value.
    pub fn now_synced_at(&self) -> SyncedAt {
        self.to_synced_at(Utc::now())
    }

    /// Convert an instant to a `synced_at` value.
    ///
    /// Sub-millisecond precision is truncated.
    pub fn to_synced_at(&self, instant: DateTime<Utc>) -> SyncedAt {
        SyncedAt::new(instant.timestamp_millis().saturating_sub(self.base_time))
    }

    /// Convert a `synced_at` value back to an instant.
    ///
    /// Exact inverse of [`SyncClock::to_synced_at`]. Returns `None` when
    /// the value lies outside the representable calendar range.
    pub fn to_instant(&self, synced_at: SyncedAt) -> Option<DateTime<Utc>> {
        synced_at
            .value()
            .checked_add(self.base_time)
            .and_then(instant_from_millis)
    }
}

impl Default for SyncClock {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_TIME)
    }
}

/// Instant for absolute Unix milliseconds.
///
/// Sync tokens are rebased to absolute milliseconds when decoded, so the
/// delta filter converts them without adding the epoch again.
pub fn instant_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}
