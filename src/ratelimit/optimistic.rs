//! Lock-free rate limiter using versioned compare-and-swap.
//!
//! Instead of holding a lock across the load and the save, this limiter
//! saves with the version it loaded and starts over when another writer got
//! there first. The atomicity lives in the store, so it holds across any
//! number of processes sharing that store.

use async_trait::async_trait;
use tracing::{trace, warn};

use super::backend::RateLimiterBackend;
use super::clock::{Clock, SystemClock};
use super::policy::Policy;
use super::rate::RateState;
use super::window;
use crate::error::{GateError, Result};
use crate::storage::{Versioned, VersionedRateStore};

/// Default number of load/compare-and-save rounds before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 16;

/// A rate limiter that retries on write conflicts rather than locking.
pub struct OptimisticRateLimiter<S, C = SystemClock> {
    /// The versioned store
    store: S,
    /// Time source for window evaluation
    clock: C,
    /// Upper bound on rounds per consume
    max_attempts: u32,
}

impl<S: VersionedRateStore> OptimisticRateLimiter<S> {
    /// Create a new optimistic limiter with default settings.
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock, DEFAULT_MAX_ATTEMPTS)
    }
}

impl<S: VersionedRateStore, C: Clock> OptimisticRateLimiter<S, C> {
    /// Create an optimistic limiter with an explicit clock and retry bound.
    ///
    /// A bound of zero is treated as one.
    pub fn with_clock(store: S, clock: C, max_attempts: u32) -> Self {
        Self {
            store,
            clock,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Consume from `key`'s window and persist the result.
    ///
    /// Fails with [`GateError::Contention`] if every attempt lost its
    /// compare-and-save to a concurrent writer.
    pub async fn consume(
        &self,
        policy: &Policy,
        key: &str,
        request_time: Option<u64>,
    ) -> Result<RateState> {
        policy.validate()?;
        if key.is_empty() {
            return Err(GateError::InvalidKey);
        }

        for attempt in 1..=self.max_attempts {
            let (prior, version) = match self.store.load_versioned(key).await? {
                Some(Versioned { value, version }) => (Some(value), Some(version)),
                None => (None, None),
            };

            let advance = window::advance(policy, key, prior, self.clock.now(), request_time)?;

            if self.store.compare_and_save(&advance.state, version).await? {
                trace!(key = %key, attempt, "Committed rate state");
                window::report(&advance);
                return Ok(advance.state);
            }

            trace!(key = %key, attempt, expected = ?version, "Rate state changed underneath, retrying");
            tokio::task::yield_now().await;
        }

        warn!(
            key = %key,
            attempts = self.max_attempts,
            "Gave up on contended rate state"
        );
        Err(GateError::Contention {
            key: key.to_string(),
            attempts: self.max_attempts,
        })
    }

    /// Get the store backing this limiter.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the retry bound.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[async_trait]
impl<S: VersionedRateStore, C: Clock> RateLimiterBackend for OptimisticRateLimiter<S, C> {
    async fn consume(
        &self,
        policy: &Policy,
        key: &str,
        request_time: Option<u64>,
    ) -> Result<RateState> {
        self.consume(policy, key, request_time).await
    }
}
