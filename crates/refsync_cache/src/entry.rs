//! Cache entries and the staleness policy.

use refsync_model::{LibraryIdentity, Snapshot};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Staleness policy for cached snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Maximum age after which a cached snapshot reads as absent.
    pub staleness_horizon: Duration,
}

impl CachePolicy {
    /// Default staleness horizon.
    pub const DEFAULT_HORIZON: Duration = Duration::from_secs(5 * 24 * 60 * 60);

    /// Creates a policy with the given horizon.
    #[must_use]
    pub fn new(staleness_horizon: Duration) -> Self {
        Self { staleness_horizon }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_HORIZON)
    }
}

/// A persisted snapshot record for one library identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The library this snapshot belongs to.
    pub identity: LibraryIdentity,
    /// The snapshot itself.
    pub snapshot: Snapshot,
    /// When the record was stored.
    pub stored_at: SystemTime,
}

impl CacheEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(identity: LibraryIdentity, snapshot: Snapshot) -> Self {
        Self {
            identity,
            snapshot,
            stored_at: SystemTime::now(),
        }
    }

    /// Overrides the stored timestamp.
    ///
    /// Used by tests to age entries artificially and by stores that
    /// rewrite records without refreshing them.
    #[must_use]
    pub fn with_stored_at(mut self, stored_at: SystemTime) -> Self {
        self.stored_at = stored_at;
        self
    }

    /// Returns true if this entry is older than the policy's horizon.
    ///
    /// An entry stamped in the future (clock skew) counts as fresh.
    #[must_use]
    pub fn is_expired(&self, policy: &CachePolicy, now: SystemTime) -> bool {
        match now.duration_since(self.stored_at) {
            Ok(age) => age > policy.staleness_horizon,
            Err(_) => false,
        }
    }
}
