//! Storage collaborators for rate state.
//!
//! A limiter only ever talks to storage through these traits, so the same
//! algorithm runs over an in-process map or a remote store. Backends own
//! their own timeouts and eviction; the limiter never sweeps.

mod memory;
mod timeout;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::ratelimit::RateState;

pub use memory::InMemoryRateStore;
pub use timeout::TimeoutStore;

/// A value paired with the version it was stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Plain load/save access to rate state.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Fetch the most recently saved state for `key`, or `None` if absent.
    async fn load(&self, key: &str) -> StorageResult<Option<RateState>>;

    /// Store `state` under `state.key`, replacing any previous value.
    async fn save(&self, state: &RateState) -> StorageResult<()>;
}

/// Storage that can reject a save when someone else wrote first.
///
/// This is what lets the optimistic limiter stay correct across processes
/// that share one backend.
#[async_trait]
pub trait VersionedRateStore: Send + Sync {
    async fn load_versioned(&self, key: &str) -> StorageResult<Option<Versioned<RateState>>>;

    /// Store `state` only if the current version for its key is `expected`
    /// (`None` meaning no record exists yet). Returns `false` on conflict.
    async fn compare_and_save(&self, state: &RateState, expected: Option<u64>)
        -> StorageResult<bool>;
}

#[async_trait]
impl<S: RateStore + ?Sized> RateStore for Arc<S> {
    async fn load(&self, key: &str) -> StorageResult<Option<RateState>> {
        (**self).load(key).await
    }

    async fn save(&self, state: &RateState) -> StorageResult<()> {
        (**self).save(state).await
    }
}

#[async_trait]
impl<S: VersionedRateStore + ?Sized> VersionedRateStore for Arc<S> {
    async fn load_versioned(&self, key: &str) -> StorageResult<Option<Versioned<RateState>>> {
        (**self).load_versioned(key).await
    }

    async fn compare_and_save(
        &self,
        state: &RateState,
        expected: Option<u64>,
    ) -> StorageResult<bool> {
        (**self).compare_and_save(state, expected).await
    }
}
