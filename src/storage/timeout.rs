//! Bounded storage access.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use super::{RateStore, Versioned, VersionedRateStore};
use crate::error::{StorageError, StorageResult};
use crate::ratelimit::RateState;

/// Wraps a store so no single call can suspend longer than `timeout`.
#[derive(Debug, Clone)]
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S> TimeoutStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Get the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn bounded<T, F>(&self, fut: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>> + Send,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StorageError::Timeout(self.timeout_millis()))?
    }

    /// The bound in milliseconds, saturating at `u64::MAX`.
    pub fn timeout_millis(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

#[async_trait]
impl<S: RateStore> RateStore for TimeoutStore<S> {
    async fn load(&self, key: &str) -> StorageResult<Option<RateState>> {
        self.bounded(self.inner.load(key)).await
    }

    async fn save(&self, state: &RateState) -> StorageResult<()> {
        self.bounded(self.inner.save(state)).await
    }
}

#[async_trait]
impl<S: VersionedRateStore> VersionedRateStore for TimeoutStore<S> {
    async fn load_versioned(&self, key: &str) -> StorageResult<Option<Versioned<RateState>>> {
        self.bounded(self.inner.load_versioned(key)).await
    }

    async fn compare_and_save(
        &self,
        state: &RateState,
        expected: Option<u64>,
    ) -> StorageResult<bool> {
        self.bounded(self.inner.compare_and_save(state, expected)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryRateStore;
    use chrono::Utc;

    struct StalledStore;

    #[async_trait]
    impl RateStore for StalledStore {
        async fn load(&self, _key: &str) -> StorageResult<Option<RateState>> {
            std::future::pending().await
        }

        async fn save(&self, _state: &RateState) -> StorageResult<()> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_stalled_load_times_out() {
        let store = TimeoutStore::new(StalledStore, Duration::from_millis(50));
        let err = store.load("k").await.unwrap_err();
        assert_eq!(err, StorageError::Timeout(50));
    }

    #[tokio::test]
    async fn test_passes_through_fast_store() {
        let store = TimeoutStore::new(InMemoryRateStore::new(), Duration::from_secs(1));
        let state = RateState::new("k", Some(1), None, 1_000, Utc::now());

        store.save(&state).await.unwrap();
        assert_eq!(store.load("k").await.unwrap(), Some(state));
        assert_eq!(store.inner().len(), 1);
    }

    #[test]
    fn test_timeout_millis_saturates() {
        let store = TimeoutStore::new(InMemoryRateStore::new(), Duration::from_millis(250));
        assert_eq!(store.timeout_millis(), 250);

        let store = TimeoutStore::new(InMemoryRateStore::new(), Duration::MAX);
        assert_eq!(store.timeout_millis(), u64::MAX);
    }
}
