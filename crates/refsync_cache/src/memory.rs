//! In-memory cache store.

use crate::entry::{CacheEntry, CachePolicy};
use crate::error::CacheResult;
use crate::store::CacheStore;
use parking_lot::RwLock;
use refsync_model::LibraryIdentity;
use std::collections::HashMap;
use std::time::SystemTime;

/// An in-memory cache store.
///
/// Suitable for tests and for consumers that only want the in-process
/// snapshot sharing, not persistence across restarts.
///
/// # Thread Safety
///
/// All operations take the internal lock for the duration of the single
/// map access, so reads never observe partial writes.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    policy: CachePolicy,
    entries: RwLock<HashMap<LibraryIdentity, CacheEntry>>,
}

impl MemoryCacheStore {
    /// Creates a store with the default staleness policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with a specific policy.
    #[must_use]
    pub fn with_policy(policy: CachePolicy) -> Self {
        Self {
            policy,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the number of physically stored records (expired included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl CacheStore for MemoryCacheStore {
    fn read(&self, identity: &LibraryIdentity) -> CacheResult<Option<CacheEntry>> {
        Ok(self
            .read_stale(identity)?
            .filter(|entry| !entry.is_expired(&self.policy, SystemTime::now())))
    }

    fn read_stale(&self, identity: &LibraryIdentity) -> CacheResult<Option<CacheEntry>> {
        Ok(self.entries.read().get(identity).cloned())
    }

    fn write_entry(&self, entry: CacheEntry) -> CacheResult<()> {
        self.entries.write().insert(entry.identity.clone(), entry);
        Ok(())
    }

    fn invalidate(&self, identity: &LibraryIdentity) -> CacheResult<()> {
        self.entries.write().remove(identity);
        Ok(())
    }

    fn compact(&self) -> CacheResult<usize> {
        let now = SystemTime::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(&self.policy, now));
        Ok(before - entries.len())
    }

    fn policy(&self) -> &CachePolicy {
        &self.policy
    }
}
