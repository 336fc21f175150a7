//! Per-key rate state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters floor at this value instead of going further negative.
pub const FLOOR: i64 = -1;

/// The live window for a single key.
///
/// One record exists per key. It is created lazily on the first request and
/// replaced wholesale when its window has passed. Counters that the policy
/// does not limit stay `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateState {
    /// The key this window belongs to
    pub key: String,
    /// Request limit captured when the window opened
    pub limit: Option<i64>,
    /// Requests left in this window
    pub remaining: Option<i64>,
    /// Time quota captured when the window opened, in milliseconds
    pub quota: Option<i64>,
    /// Quota left in this window, in milliseconds
    pub remaining_quota: Option<i64>,
    /// Milliseconds until the window ends, as of the last consume
    pub reset: i64,
    /// When the window ends
    pub expiration: DateTime<Utc>,
}

impl RateState {
    /// Open a fresh window.
    pub fn new(
        key: impl Into<String>,
        limit: Option<i64>,
        quota: Option<i64>,
        refresh_interval_ms: i64,
        expiration: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            limit,
            remaining: limit,
            quota,
            remaining_quota: quota,
            reset: refresh_interval_ms,
            expiration,
        }
    }

    /// Whether the window has ended as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration
    }

    /// Whether the request count went below zero.
    pub fn is_count_exhausted(&self) -> bool {
        self.remaining.is_some_and(|r| r < 0)
    }

    /// Whether the time quota went below zero.
    pub fn is_quota_exhausted(&self) -> bool {
        self.remaining_quota.is_some_and(|r| r < 0)
    }

    /// Whether a gateway should deny the caller.
    pub fn is_limited(&self) -> bool {
        self.is_count_exhausted() || self.is_quota_exhausted()
    }

    /// Take one request off the count, flooring at [`FLOOR`].
    pub(crate) fn consume_request(&mut self) {
        if let Some(remaining) = self.remaining {
            self.remaining = Some(remaining.saturating_sub(1).max(FLOOR));
        }
    }

    /// Charge `elapsed_ms` against the quota, flooring at [`FLOOR`].
    pub(crate) fn consume_quota(&mut self, elapsed_ms: u64) {
        if let Some(remaining) = self.remaining_quota {
            let charge = i64::try_from(elapsed_ms).unwrap_or(i64::MAX);
            self.remaining_quota = Some(remaining.saturating_sub(charge).max(FLOOR));
        }
    }
}
