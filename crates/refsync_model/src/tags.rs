//! Case-insensitive tag indexing.
//!
//! Libraries accumulate thousands of distinct tags with inconsistent
//! casing ("AI", "ai", "Ai"). The index folds raw tokens case-insensitively
//! with one O(1) map lookup per incoming token, replacing the naive
//! scan-all-existing-tokens approach that goes quadratic in the number of
//! distinct tags.

use crate::item::{Item, ItemKey};
use std::collections::{BTreeSet, HashMap};

/// One normalized tag with everything observed under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEntry {
    /// The normalized (trimmed, lowercased) token.
    pub normalized: String,
    /// Raw-case variants in first-seen order, deduplicated.
    pub variants: Vec<String>,
    /// Keys of the items carrying this tag.
    pub sources: BTreeSet<ItemKey>,
}

impl TagEntry {
    fn new(normalized: String) -> Self {
        Self {
            normalized,
            variants: Vec::new(),
            sources: BTreeSet::new(),
        }
    }
}

/// A case-insensitive index over the tag tokens of a snapshot.
///
/// Entries are kept in first-seen order; a position map gives O(1)
/// lookup per normalized token. Merging is idempotent: feeding the same
/// token/source pair twice changes nothing.
#[derive(Debug, Clone, Default)]
pub struct TagIndex {
    entries: Vec<TagEntry>,
    positions: HashMap<String, usize>,
}

impl TagIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from a full item list.
    #[must_use]
    pub fn from_items<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = &'a Item>,
    {
        let mut index = Self::new();
        for item in items {
            for raw in &item.tags {
                index.merge_token(raw, &item.key);
            }
        }
        index
    }

    /// Normalizes a raw token: trimmed and Unicode-lowercased.
    #[must_use]
    pub fn normalize(raw: &str) -> String {
        raw.trim().to_lowercase()
    }

    /// Merges a single raw token from a source item into the index.
    ///
    /// Empty (or whitespace-only) tokens are ignored.
    pub fn merge_token(&mut self, raw: &str, source: &ItemKey) {
        let normalized = Self::normalize(raw);
        if normalized.is_empty() {
            return;
        }

        let position = match self.positions.get(&normalized) {
            Some(&position) => position,
            None => {
                let position = self.entries.len();
                self.entries.push(TagEntry::new(normalized.clone()));
                self.positions.insert(normalized, position);
                position
            }
        };

        let entry = &mut self.entries[position];
        let raw = raw.trim();
        if !entry.variants.iter().any(|variant| variant == raw) {
            entry.variants.push(raw.to_string());
        }
        entry.sources.insert(source.clone());
    }

    /// Merges every tag of every given item.
    pub fn merge_items<'a, I>(&mut self, items: I)
    where
        I: IntoIterator<Item = &'a Item>,
    {
        for item in items {
            for raw in &item.tags {
                self.merge_token(raw, &item.key);
            }
        }
    }

    /// Looks up the entry for a token (any casing).
    #[must_use]
    pub fn get(&self, token: &str) -> Option<&TagEntry> {
        self.positions
            .get(&Self::normalize(token))
            .map(|&position| &self.entries[position])
    }

    /// Returns true if a token (any casing) is indexed.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.get(token).is_some()
    }

    /// Returns the entries in first-seen order.
    #[must_use]
    pub fn entries(&self) -> &[TagEntry] {
        &self.entries
    }

    /// Returns the number of distinct normalized tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no tags are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemType;

    fn key(key: &str) -> ItemKey {
        ItemKey::new(key)
    }

    #[test]
    fn case_variants_fold_into_one_entry() {
        // ["AI", "ai", "ML"] -> two entries: ai (two sources) and ml (one)
        let mut index = TagIndex::new();
        index.merge_token("AI", &key("A1111111"));
        index.merge_token("ai", &key("B2222222"));
        index.merge_token("ML", &key("A1111111"));

        assert_eq!(index.len(), 2);

        let ai = index.get("ai").unwrap();
        assert_eq!(ai.sources.len(), 2);
        assert_eq!(ai.variants, vec!["AI", "ai"]);

        let ml = index.get("ML").unwrap();
        assert_eq!(ml.normalized, "ml");
        assert_eq!(ml.sources.len(), 1);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut index = TagIndex::new();
        index.merge_token("Rust", &key("A1111111"));
        index.merge_token("Rust", &key("A1111111"));

        assert_eq!(index.len(), 1);
        let entry = index.get("rust").unwrap();
        assert_eq!(entry.variants.len(), 1);
        assert_eq!(entry.sources.len(), 1);
    }

    #[test]
    fn entries_keep_first_seen_order() {
        let mut index = TagIndex::new();
        index.merge_token("zebra", &key("A1111111"));
        index.merge_token("apple", &key("A1111111"));
        index.merge_token("Zebra", &key("B2222222"));

        let order: Vec<_> = index.entries().iter().map(|e| e.normalized.as_str()).collect();
        assert_eq!(order, vec!["zebra", "apple"]);
    }

    #[test]
    fn whitespace_tokens_ignored() {
        let mut index = TagIndex::new();
        index.merge_token("   ", &key("A1111111"));
        index.merge_token("", &key("A1111111"));
        assert!(index.is_empty());
    }

    #[test]
    fn from_items_indexes_everything() {
        let items = vec![
            Item::new("A1111111", 1, ItemType::Article)
                .with_tag("Databases")
                .with_tag("Sync"),
            Item::new("B2222222", 1, ItemType::Book).with_tag("databases"),
        ];

        let index = TagIndex::from_items(&items);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("DATABASES").unwrap().sources.len(), 2);
        assert!(index.contains("sync"));
    }

    #[test]
    fn unicode_case_folding() {
        let mut index = TagIndex::new();
        index.merge_token("Größe", &key("A1111111"));
        index.merge_token("GRÖSSE", &key("B2222222"));

        // to_lowercase maps ß -> ß and Ö -> ö; the two variants differ
        // (SS vs ß) so they stay distinct entries.
        assert!(index.contains("größe"));
        assert!(index.contains("grösse"));
        assert_eq!(index.len(), 2);
    }
}
