//! The cache store trait.

use crate::entry::{CacheEntry, CachePolicy};
use crate::error::CacheResult;
use refsync_model::{LibraryIdentity, Snapshot};

/// A store persisting one snapshot record per library identity.
///
/// Implementations must make `read` and `write` atomic per key: a read
/// never observes a half-written record. Entries for different identities
/// are independent; no cross-identity locking is required or implied.
///
/// Staleness is part of the read contract: a record older than the
/// store's [`CachePolicy`] horizon reads as `None` even while it still
/// physically exists. [`CacheStore::compact`] reclaims such records but is
/// never required for correctness.
pub trait CacheStore: Send + Sync {
    /// Reads the entry for an identity.
    ///
    /// Returns `Ok(None)` if no record exists, the record is expired, or
    /// the record's on-disk format is unreadable (which a caller treats
    /// as a cache miss and resolves with a full resync).
    fn read(&self, identity: &LibraryIdentity) -> CacheResult<Option<CacheEntry>>;

    /// Reads the entry for an identity regardless of staleness.
    ///
    /// A stale snapshot must not be *served*, but it is still a valid
    /// base for an incremental fetch (the remote is asked only for
    /// changes since its version). Sync engines use this; consumer-facing
    /// reads go through [`CacheStore::read`].
    fn read_stale(&self, identity: &LibraryIdentity) -> CacheResult<Option<CacheEntry>>;

    /// Writes a snapshot for an identity, stamped with the current time.
    ///
    /// Overwrites any previous record for the identity as a single
    /// atomic replacement.
    fn write(&self, identity: &LibraryIdentity, snapshot: Snapshot) -> CacheResult<()> {
        self.write_entry(CacheEntry::new(identity.clone(), snapshot))
    }

    /// Writes a fully specified entry (explicit timestamp).
    fn write_entry(&self, entry: CacheEntry) -> CacheResult<()>;

    /// Drops the record for an identity, if any.
    fn invalidate(&self, identity: &LibraryIdentity) -> CacheResult<()>;

    /// Physically removes expired (and unreadable) records.
    ///
    /// Returns the number of records removed.
    fn compact(&self) -> CacheResult<usize>;

    /// Returns the staleness policy this store applies on read.
    fn policy(&self) -> &CachePolicy;
}
