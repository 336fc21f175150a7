//! In-process rate state storage.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::{RateStore, Versioned, VersionedRateStore};
use crate::error::StorageResult;
use crate::ratelimit::RateState;

/// Rate state held in a concurrent map.
///
/// Every write stamps the key with a fresh version, so this store serves
/// both the striped limiter and the optimistic one. Versions come from one
/// store-wide counter and are never handed out twice, even after a key is
/// purged and recreated.
#[derive(Debug, Default)]
pub struct InMemoryRateStore {
    states: DashMap<String, Versioned<RateState>>,
    /// Last version handed out
    last_version: AtomicU64,
}

impl InMemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every state whose window has ended as of `now`.
    ///
    /// Returns the number of evicted keys.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.states.len();
        self.states.retain(|_, stored| !stored.value.is_expired(now));
        let purged = before.saturating_sub(self.states.len());
        if purged > 0 {
            debug!(purged, remaining = self.states.len(), "Purged expired rate states");
        }
        purged
    }

    /// Pair `state` with a version no earlier write has used.
    fn stamp(&self, state: &RateState) -> Versioned<RateState> {
        Versioned {
            value: state.clone(),
            version: self.last_version.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }

    /// Number of keys with stored state.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Clear all stored state.
    pub fn clear(&self) {
        self.states.clear();
    }

    /// Current version for `key`, if any.
    pub fn version(&self, key: &str) -> Option<u64> {
        self.states.get(key).map(|stored| stored.version)
    }
}

#[async_trait]
impl RateStore for InMemoryRateStore {
    async fn load(&self, key: &str) -> StorageResult<Option<RateState>> {
        Ok(self.states.get(key).map(|stored| stored.value.clone()))
    }

    async fn save(&self, state: &RateState) -> StorageResult<()> {
        match self.states.entry(state.key.clone()) {
            Entry::Occupied(mut entry) => {
                entry.insert(self.stamp(state));
            }
            Entry::Vacant(entry) => {
                entry.insert(self.stamp(state));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl VersionedRateStore for InMemoryRateStore {
    async fn load_versioned(&self, key: &str) -> StorageResult<Option<Versioned<RateState>>> {
        Ok(self.states.get(key).map(|stored| stored.clone()))
    }

    async fn compare_and_save(
        &self,
        state: &RateState,
        expected: Option<u64>,
    ) -> StorageResult<bool> {
        match (self.states.entry(state.key.clone()), expected) {
            (Entry::Occupied(mut entry), Some(expected)) if entry.get().version == expected => {
                entry.insert(self.stamp(state));
                Ok(true)
            }
            (Entry::Vacant(entry), None) => {
                entry.insert(self.stamp(state));
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
