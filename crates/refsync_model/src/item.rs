//! Item types: the records a remote library is made of.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The stable key of a remote item.
///
/// Keys are assigned by the remote (8-character alphanumeric strings) and
/// never change across versions of the same item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    /// Creates an item key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for ItemKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The type tag of an item.
///
/// Unknown remote types round-trip through [`ItemType::Other`] rather than
/// failing to parse; the remote adds types over time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemType {
    /// A journal or magazine article.
    Article,
    /// A book.
    Book,
    /// A chapter or section within a book.
    BookSection,
    /// A technical report.
    Report,
    /// A thesis or dissertation.
    Thesis,
    /// A web page.
    Webpage,
    /// A free-form note, attached to a parent item or standalone.
    Note,
    /// A file attachment, always attached to a parent item.
    Attachment,
    /// An annotation on an attachment.
    Annotation,
    /// Any type this crate does not model explicitly.
    Other(String),
}

impl ItemType {
    /// Returns the wire name of this type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            ItemType::Article => "article",
            ItemType::Book => "book",
            ItemType::BookSection => "bookSection",
            ItemType::Report => "report",
            ItemType::Thesis => "thesis",
            ItemType::Webpage => "webpage",
            ItemType::Note => "note",
            ItemType::Attachment => "attachment",
            ItemType::Annotation => "annotation",
            ItemType::Other(name) => name,
        }
    }

    /// Returns true for types that live under a parent item.
    #[must_use]
    pub fn is_child_type(&self) -> bool {
        matches!(
            self,
            ItemType::Note | ItemType::Attachment | ItemType::Annotation
        )
    }
}

impl From<String> for ItemType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "article" => ItemType::Article,
            "book" => ItemType::Book,
            "bookSection" => ItemType::BookSection,
            "report" => ItemType::Report,
            "thesis" => ItemType::Thesis,
            "webpage" => ItemType::Webpage,
            "note" => ItemType::Note,
            "attachment" => ItemType::Attachment,
            "annotation" => ItemType::Annotation,
            _ => ItemType::Other(name),
        }
    }
}

impl From<ItemType> for String {
    fn from(item_type: ItemType) -> Self {
        item_type.as_str().to_string()
    }
}

/// A single record in a remote library.
///
/// Items form a tree: notes, attachments and annotations carry a
/// `parent_item` back-reference to a top-level item. The tree has no
/// cycles by API contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Stable remote key.
    pub key: ItemKey,
    /// Monotonically increasing remote version.
    pub version: u64,
    /// Type tag.
    pub item_type: ItemType,
    /// Parent item for notes/attachments/annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_item: Option<ItemKey>,
    /// Keys of the collections this item belongs to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<String>,
    /// Type-specific field values (title, creators, date, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
    /// Raw tag tokens, case preserved as entered by the user.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Item {
    /// Creates an item with no parent, fields or tags.
    pub fn new(key: impl Into<ItemKey>, version: u64, item_type: ItemType) -> Self {
        Self {
            key: key.into(),
            version,
            item_type,
            parent_item: None,
            collections: Vec::new(),
            fields: BTreeMap::new(),
            tags: Vec::new(),
        }
    }

    /// Sets the parent item.
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<ItemKey>) -> Self {
        self.parent_item = Some(parent.into());
        self
    }

    /// Adds a field value.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Adds a raw tag token.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Adds a collection membership.
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collections.push(collection.into());
        self
    }

    /// Returns true if this item is a top-level item (no parent reference).
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.parent_item.is_none()
    }
}
