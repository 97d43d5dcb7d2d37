//! Linear-time delta merging.

use crate::item::{Item, ItemKey};
use crate::snapshot::{Delta, Snapshot};
use std::collections::HashMap;
use std::time::SystemTime;
use thiserror::Error;

/// Maximum number of versions a delta base may lag behind the snapshot it
/// is merged into. Beyond this the merge is refused and the caller must
/// perform a full refetch.
pub const MAX_BASE_LAG: u64 = 2;

/// Result type for merge operations.
pub type MergeResult<T> = Result<T, MergeError>;

/// Errors reported by the delta merger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    /// The delta was computed against a base too far behind the snapshot,
    /// or would move the snapshot version backwards. Merging would produce
    /// a state the remote never had; a full refetch is required instead.
    #[error(
        "delta {base_version}..{to_version} conflicts with snapshot at version \
         {snapshot_version}; full refetch required"
    )]
    VersionConflict {
        /// Version of the snapshot the merge was attempted against.
        snapshot_version: u64,
        /// Base version the delta was computed against.
        base_version: u64,
        /// Version the delta advances to.
        to_version: u64,
    },
}

/// Merges a delta into a snapshot, producing a new snapshot.
///
/// Cost is linear in `snapshot.len() + delta.modified.len() +
/// delta.deleted.len()`: one pass builds a key → position map, each
/// modified item then replaces its existing position or is appended, and
/// deletions are excised at the end. The input snapshot is untouched.
///
/// Ordering: unchanged items keep their former relative order, new items
/// are appended in delta order, then deletions are removed.
///
/// # Errors
///
/// [`MergeError::VersionConflict`] when the delta base lags the snapshot
/// by more than [`MAX_BASE_LAG`] versions, or when the delta's target
/// version is older than the snapshot itself.
pub fn merge(snapshot: &Snapshot, delta: &Delta, fetched_at: SystemTime) -> MergeResult<Snapshot> {
    let conflict = || MergeError::VersionConflict {
        snapshot_version: snapshot.version(),
        base_version: delta.base_version,
        to_version: delta.to_version,
    };

    if delta.to_version < snapshot.version() {
        return Err(conflict());
    }
    if snapshot.version() > delta.base_version
        && snapshot.version() - delta.base_version > MAX_BASE_LAG
    {
        return Err(conflict());
    }

    let mut merged: Vec<Option<Item>> = snapshot.items().iter().cloned().map(Some).collect();
    let mut positions: HashMap<ItemKey, usize> = snapshot
        .items()
        .iter()
        .enumerate()
        .map(|(position, item)| (item.key.clone(), position))
        .collect();

    for item in &delta.modified {
        match positions.get(&item.key) {
            Some(&position) => merged[position] = Some(item.clone()),
            None => {
                positions.insert(item.key.clone(), merged.len());
                merged.push(Some(item.clone()));
            }
        }
    }

    for key in &delta.deleted {
        if let Some(&position) = positions.get(key) {
            merged[position] = None;
        }
    }

    let items: Vec<_> = merged.into_iter().flatten().collect();
    Ok(Snapshot::new(items, delta.to_version, fetched_at))
}
