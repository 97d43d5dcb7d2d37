//! Snapshots and deltas.

use crate::item::{Item, ItemKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::SystemTime;

/// An immutable view of a library's items at a point in time.
///
/// A snapshot is created by a merge (or a full fetch) at the end of a sync
/// cycle, read by any number of concurrent consumers, and superseded (never
/// mutated) by the next cycle's output. Readers holding a snapshot never
/// see it change underneath them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    items: Vec<Item>,
    version: u64,
    fetched_at: SystemTime,
}

impl Snapshot {
    /// Creates a snapshot from an ordered item list.
    ///
    /// Item keys must be unique; this is upheld by the merge algorithm and
    /// checked here in debug builds.
    #[must_use]
    pub fn new(items: Vec<Item>, version: u64, fetched_at: SystemTime) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                items.iter().all(|item| seen.insert(&item.key))
            },
            "snapshot item keys must be unique"
        );
        Self {
            items,
            version,
            fetched_at,
        }
    }

    /// Creates an empty snapshot at version 0.
    #[must_use]
    pub fn empty(fetched_at: SystemTime) -> Self {
        Self::new(Vec::new(), 0, fetched_at)
    }

    /// Returns the items in snapshot order.
    #[must_use]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Returns the library version this snapshot was fetched at.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns when this snapshot was fetched.
    #[must_use]
    pub fn fetched_at(&self) -> SystemTime {
        self.fetched_at
    }

    /// Returns the number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the snapshot holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Looks up an item by key.
    #[must_use]
    pub fn get(&self, key: &ItemKey) -> Option<&Item> {
        self.items.iter().find(|item| &item.key == key)
    }

    /// Returns true if an item with the given key is present.
    #[must_use]
    pub fn contains_key(&self, key: &ItemKey) -> bool {
        self.get(key).is_some()
    }

    /// Builds a key → position map over the item list in one pass.
    ///
    /// This is the lookup structure the merge algorithm and tree views use
    /// to stay linear in the snapshot size.
    #[must_use]
    pub fn key_positions(&self) -> HashMap<&ItemKey, usize> {
        self.items
            .iter()
            .enumerate()
            .map(|(position, item)| (&item.key, position))
            .collect()
    }

    /// Builds a parent → children map.
    ///
    /// Only children whose parent is present in this snapshot appear;
    /// orphaned children (parent deleted or not yet fetched) are excluded
    /// from the view rather than being an error.
    #[must_use]
    pub fn children(&self) -> HashMap<&ItemKey, Vec<&Item>> {
        let positions = self.key_positions();
        let mut children: HashMap<&ItemKey, Vec<&Item>> = HashMap::new();
        for item in &self.items {
            if let Some(parent) = &item.parent_item {
                if positions.contains_key(parent) {
                    children.entry(parent).or_default().push(item);
                }
            }
        }
        children
    }

    /// Returns items whose `parent_item` is absent from this snapshot.
    #[must_use]
    pub fn orphans(&self) -> Vec<&Item> {
        let positions = self.key_positions();
        self.items
            .iter()
            .filter(|item| {
                item.parent_item
                    .as_ref()
                    .is_some_and(|parent| !positions.contains_key(parent))
            })
            .collect()
    }

    /// Iterates over top-level items in snapshot order.
    pub fn top_level(&self) -> impl Iterator<Item = &Item> + '_ {
        self.items.iter().filter(|item| item.is_top_level())
    }
}

/// An incremental change set relative to a prior snapshot version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    /// The snapshot version this delta was computed against.
    pub base_version: u64,
    /// The library version after applying this delta.
    pub to_version: u64,
    /// Items created or modified since `base_version`, in remote order.
    pub modified: Vec<Item>,
    /// Keys of items deleted since `base_version`.
    pub deleted: BTreeSet<ItemKey>,
}

impl Delta {
    /// Creates an empty delta between two versions.
    #[must_use]
    pub fn new(base_version: u64, to_version: u64) -> Self {
        Self {
            base_version,
            to_version,
            modified: Vec::new(),
            deleted: BTreeSet::new(),
        }
    }

    /// Sets the modified items.
    #[must_use]
    pub fn with_modified(mut self, modified: Vec<Item>) -> Self {
        self.modified = modified;
        self
    }

    /// Adds a deleted key.
    #[must_use]
    pub fn with_deleted(mut self, key: impl Into<ItemKey>) -> Self {
        self.deleted.insert(key.into());
        self
    }

    /// Returns true if the delta carries no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.deleted.is_empty()
    }
}
