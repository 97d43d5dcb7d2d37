//! Item and snapshot fixtures.

use refsync_model::{Item, ItemType, Snapshot};
use std::time::SystemTime;

/// Creates an article with the given tags.
pub fn article(key: &str, tags: &[&str]) -> Item {
    let mut item = Item::new(key, 1, ItemType::Article)
        .with_field("title", format!("Article {key}"))
        .with_field("date", "2024");
    for tag in tags {
        item = item.with_tag(*tag);
    }
    item
}

/// Creates a book.
pub fn book(key: &str) -> Item {
    Item::new(key, 1, ItemType::Book).with_field("title", format!("Book {key}"))
}

/// Creates a note attached to a parent item.
pub fn note(key: &str, parent: &str) -> Item {
    Item::new(key, 1, ItemType::Note)
        .with_parent(parent)
        .with_field("note", "annotated while reading")
}

/// Creates an attachment under a parent item.
pub fn attachment(key: &str, parent: &str) -> Item {
    Item::new(key, 1, ItemType::Attachment)
        .with_parent(parent)
        .with_field("filename", format!("{key}.pdf"))
}

/// Creates `count` top-level articles with deterministic keys.
///
/// Keys are `ITEM0000`, `ITEM0001`, ... and every third item carries a
/// tag so tag-index tests have something to chew on.
pub fn item_batch(count: usize) -> Vec<Item> {
    (0..count)
        .map(|i| {
            let mut item = Item::new(format!("ITEM{i:04}"), 1, ItemType::Article)
                .with_field("title", format!("Item {i}"));
            if i % 3 == 0 {
                item = item.with_tag(if i % 2 == 0 { "Even" } else { "even" });
            }
            item
        })
        .collect()
}

/// Creates a snapshot from items at a version, stamped now.
pub fn snapshot_of(items: Vec<Item>, version: u64) -> Snapshot {
    Snapshot::new(items, version, SystemTime::now())
}
