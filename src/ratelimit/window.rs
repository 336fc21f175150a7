//! The window algorithm shared by every limiter.
//!
//! This is pure: it takes the prior state (if any) and the current instant
//! and returns the state to persist. Locking and storage live in the
//! limiters that call it.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::policy::Policy;
use super::rate::RateState;
use crate::error::{GateError, Result};

/// Outcome of advancing a key's window by one consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advance {
    /// The state to persist and hand back to the caller
    pub state: RateState,
    /// Whether a new window was opened for this call
    pub opened: bool,
}

/// Apply one consume to `prior`.
///
/// A missing or expired prior state is replaced by a fresh window. A `None`
/// `request_time` charges one request against the count; a measured
/// `request_time` (milliseconds) charges the quota instead.
pub fn advance(
    policy: &Policy,
    key: &str,
    prior: Option<RateState>,
    now: DateTime<Utc>,
    request_time: Option<u64>,
) -> Result<Advance> {
    let (mut state, opened) = match prior {
        Some(state) if !state.is_expired(now) => (state, false),
        _ => (open_window(policy, key, now)?, true),
    };

    if state.reset > 0 {
        state.reset = (state.expiration - now).num_milliseconds();
    }

    match request_time {
        None if policy.limit.is_some() => state.consume_request(),
        Some(elapsed_ms) if policy.quota.is_some() => state.consume_quota(elapsed_ms),
        _ => {}
    }

    Ok(Advance { state, opened })
}

/// Log the interesting transitions of a committed advance.
pub(crate) fn report(advance: &Advance) {
    let state = &advance.state;
    if advance.opened {
        debug!(
            key = %state.key,
            limit = ?state.limit,
            quota = ?state.quota,
            expiration = %state.expiration,
            "Opened new rate window"
        );
    }
    if state.is_limited() {
        debug!(
            key = %state.key,
            remaining = ?state.remaining,
            remaining_quota = ?state.remaining_quota,
            reset = state.reset,
            "Rate limit exceeded"
        );
    }
}

fn open_window(policy: &Policy, key: &str, now: DateTime<Utc>) -> Result<RateState> {
    let refresh_ms = policy
        .refresh_interval_millis()
        .filter(|ms| *ms > 0)
        .ok_or_else(|| {
            GateError::Config(format!(
                "invalid refresh_interval of {}s",
                policy.refresh_interval
            ))
        })?;
    let expiration = now
        .checked_add_signed(Duration::milliseconds(refresh_ms))
        .ok_or_else(|| GateError::Config("window expiration is out of range".to_string()))?;
    let limit = policy.limit.and_then(|l| i64::try_from(l).ok());

    Ok(RateState::new(
        key,
        limit,
        policy.quota_millis(),
        refresh_ms,
        expiration,
    ))
}
