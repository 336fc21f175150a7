//! Core rate limiter implementation.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{trace, warn};

use super::backend::RateLimiterBackend;
use super::clock::{Clock, SystemClock};
use super::policy::Policy;
use super::rate::RateState;
use super::window;
use crate::error::{GateError, Result};
use crate::storage::RateStore;

/// Default number of lock stripes.
pub const DEFAULT_LOCK_STRIPES: usize = 64;

/// A rate limiter that serializes same-key updates with striped locks.
///
/// Each key hashes onto one of a fixed set of async mutexes and the whole
/// load, evaluate, save sequence runs while holding it. Keys on different
/// stripes never wait on each other. This only serializes callers inside one
/// process; use [`OptimisticRateLimiter`](super::OptimisticRateLimiter) when
/// several processes share a store.
pub struct RateLimiter<S, C = SystemClock> {
    /// Where rate state lives between calls
    store: S,
    /// Time source for window evaluation
    clock: C,
    /// Per-key critical sections, selected by key hash
    stripes: Box<[Mutex<()>]>,
}

impl<S: RateStore> RateLimiter<S> {
    /// Create a new rate limiter over `store` with default settings.
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock, DEFAULT_LOCK_STRIPES)
    }
}

impl<S: RateStore, C: Clock> RateLimiter<S, C> {
    /// Create a rate limiter with an explicit clock and stripe count.
    ///
    /// A stripe count of zero is treated as one.
    pub fn with_clock(store: S, clock: C, stripes: usize) -> Self {
        let stripes = (0..stripes.max(1)).map(|_| Mutex::new(())).collect();
        Self {
            store,
            clock,
            stripes,
        }
    }

    /// Consume from `key`'s window and persist the result.
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

        trace!(key = %key, request_time = ?request_time, "Consuming rate");

        let _guard = self.stripe(key).lock().await;

        let prior = self.store.load(key).await.map_err(|e| {
            warn!(key = %key, error = %e, "Failed to load rate state");
            e
        })?;

        let advance = window::advance(policy, key, prior, self.clock.now(), request_time)?;

        self.store.save(&advance.state).await.map_err(|e| {
            warn!(key = %key, error = %e, "Failed to save rate state");
            e
        })?;

        window::report(&advance);
        Ok(advance.state)
    }

    /// Get the store backing this limiter.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the number of lock stripes.
    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    fn stripe(&self, key: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() % self.stripes.len() as u64) as usize;
        &self.stripes[index]
    }
}

#[async_trait]
impl<S: RateStore, C: Clock> RateLimiterBackend for RateLimiter<S, C> {
    async fn consume(
        &self,
        policy: &Policy,
        key: &str,
        request_time: Option<u64>,
    ) -> Result<RateState> {
        self.consume(policy, key, request_time).await
    }
}
