//! Property-based test generators using proptest.

use proptest::prelude::*;
use refsync_model::{Item, ItemKey, ItemType};

/// Strategy for valid remote item keys.
pub fn arb_item_key() -> impl Strategy<Value = ItemKey> {
    "[A-Z0-9]{8}".prop_map(|key| ItemKey::new(key))
}

/// Strategy over the modeled item types.
pub fn arb_item_type() -> impl Strategy<Value = ItemType> {
    prop_oneof![
        Just(ItemType::Article),
        Just(ItemType::Book),
        Just(ItemType::BookSection),
        Just(ItemType::Report),
        Just(ItemType::Webpage),
        Just(ItemType::Note),
        Just(ItemType::Attachment),
        "[a-z]{4,10}".prop_map(ItemType::Other),
    ]
}

/// Strategy for raw tag tokens (mixed case on purpose).
pub fn arb_tag() -> impl Strategy<Value = String> {
    "[A-Za-z]{1,12}"
}

/// Strategy for a single top-level item.
pub fn arb_item() -> impl Strategy<Value = Item> {
    (
        arb_item_key(),
        1u64..100,
        arb_item_type(),
        proptest::collection::vec(arb_tag(), 0..4),
    )
        .prop_map(|(key, version, item_type, tags)| {
            let mut item = Item::new(key, version, item_type);
            for tag in tags {
                item = item.with_tag(tag);
            }
            item
        })
}

/// Strategy for an item list with unique keys, as a snapshot requires.
pub fn arb_unique_items(max: usize) -> impl Strategy<Value = Vec<Item>> {
    proptest::collection::btree_set(arb_item_key(), 0..=max).prop_flat_map(|keys| {
        let keys: Vec<ItemKey> = keys.into_iter().collect();
        let count = keys.len();
        proptest::collection::vec(
            (
                1u64..50,
                arb_item_type(),
                proptest::collection::vec(arb_tag(), 0..3),
            ),
            count..=count,
        )
        .prop_map(move |parts| {
            keys.iter()
                .cloned()
                .zip(parts)
                .map(|(key, (version, item_type, tags))| {
                    let mut item = Item::new(key, version, item_type);
                    for tag in tags {
                        item = item.with_tag(tag);
                    }
                    item
                })
                .collect()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use refsync_model::{merge, Delta, Snapshot, TagIndex};
    use std::collections::BTreeSet;
    use std::time::SystemTime;

    proptest! {
        #[test]
        fn generated_items_roundtrip_through_json(item in arb_item()) {
            let json = serde_json::to_string(&item).unwrap();
            let back: Item = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(item, back);
        }

        #[test]
        fn tag_indexing_is_idempotent(items in arb_unique_items(12)) {
            let once = TagIndex::from_items(&items);
            let mut twice = TagIndex::from_items(&items);
            twice.merge_items(&items);

            prop_assert_eq!(once.len(), twice.len());
            for entry in once.entries() {
                let again = twice.get(&entry.normalized).unwrap();
                prop_assert_eq!(&entry.sources, &again.sources);
                prop_assert_eq!(&entry.variants, &again.variants);
            }
        }

        #[test]
        fn disjoint_deltas_commute(items in arb_unique_items(16)) {
            let half = items.len() / 2;
            let (left, right) = items.split_at(half);
            let base = Snapshot::empty(SystemTime::UNIX_EPOCH);

            let first = Delta::new(0, 1).with_modified(left.to_vec());
            let second = Delta::new(1, 2).with_modified(right.to_vec());
            let one_two = merge(
                &merge(&base, &first, SystemTime::UNIX_EPOCH).unwrap(),
                &second,
                SystemTime::UNIX_EPOCH,
            )
            .unwrap();

            let first_swapped = Delta::new(0, 1).with_modified(right.to_vec());
            let second_swapped = Delta::new(1, 2).with_modified(left.to_vec());
            let two_one = merge(
                &merge(&base, &first_swapped, SystemTime::UNIX_EPOCH).unwrap(),
                &second_swapped,
                SystemTime::UNIX_EPOCH,
            )
            .unwrap();

            let keys = |snapshot: &Snapshot| -> BTreeSet<String> {
                snapshot
                    .items()
                    .iter()
                    .map(|item| item.key.to_string())
                    .collect()
            };
            prop_assert_eq!(keys(&one_two), keys(&two_one));
        }
    }
}
