//! # Refsync Model
//!
//! Data model and pure algorithms for refsync.
//!
//! This crate provides:
//! - Library identity (owner + API-key fingerprint)
//! - Item, snapshot and delta types
//! - Linear-time delta merging
//! - Case-insensitive tag indexing
//!
//! ## Key Invariants
//!
//! - Item keys are unique within a snapshot
//! - Snapshot versions only increase for a given library
//! - A delta merges only against a base within the allowed lag;
//!   anything older reports a version conflict instead of a partial merge
//! - Orphaned child items (parent absent from the snapshot) are excluded
//!   from parent-child views, never an error
//!
//! No I/O happens in this crate; everything here is deterministic given
//! its inputs.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod identity;
mod item;
mod merge;
mod snapshot;
mod tags;

pub use identity::{LibraryIdentity, LibraryOwner};
pub use item::{Item, ItemKey, ItemType};
pub use merge::{merge, MergeError, MergeResult, MAX_BASE_LAG};
pub use snapshot::{Delta, Snapshot};
pub use tags::{TagEntry, TagIndex};
