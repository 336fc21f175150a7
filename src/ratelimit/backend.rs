//! Rate limiter trait for abstracting over concurrency strategies.

use async_trait::async_trait;

use super::policy::Policy;
use super::rate::RateState;
use crate::error::Result;

/// Trait for rate limiter implementations.
///
/// This trait abstracts over the lock-striped `RateLimiter` and the
/// `OptimisticRateLimiter` so callers can pick a strategy at startup.
#[async_trait]
pub trait RateLimiterBackend: Send + Sync {
    /// Consume from `key`'s window under `policy` and return the updated state.
    ///
    /// `request_time` is the measured duration of a finished request in
    /// milliseconds; when present it is charged to the quota, otherwise one
    /// request is charged to the count.
    async fn consume(
        &self,
        policy: &Policy,
        key: &str,
        request_time: Option<u64>,
    ) -> Result<RateState>;
}
