//! Library identity types.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// The owner of a remote library.
///
/// A library belongs either to an individual user or to a shared group;
/// the owner determines the URL prefix of every remote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum LibraryOwner {
    /// A personal user library.
    User(u64),
    /// A shared group library.
    Group(u64),
}

impl LibraryOwner {
    /// Returns the URL path prefix for this owner.
    #[must_use]
    pub fn route_prefix(&self) -> String {
        match self {
            LibraryOwner::User(id) => format!("/users/{id}"),
            LibraryOwner::Group(id) => format!("/groups/{id}"),
        }
    }

    /// Returns the numeric owner ID.
    #[must_use]
    pub fn id(&self) -> u64 {
        match self {
            LibraryOwner::User(id) | LibraryOwner::Group(id) => *id,
        }
    }
}

impl fmt::Display for LibraryOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryOwner::User(id) => write!(f, "user-{id}"),
            LibraryOwner::Group(id) => write!(f, "group-{id}"),
        }
    }
}

/// Uniquely identifies a synchronizable library.
///
/// The identity is the cache key and the in-flight-sync key. Two callers
/// holding the same owner but different API keys are distinct identities:
/// their visible libraries may differ, so their caches must not be shared.
///
/// Only a fingerprint of the API key is kept; the key itself never enters
/// the identity (and therefore never reaches the cache).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LibraryIdentity {
    /// Library owner.
    pub owner: LibraryOwner,
    /// Lowercase hex SHA-256 of the API key.
    pub api_key_fingerprint: String,
}

impl LibraryIdentity {
    /// Creates an identity from an owner and a raw API key.
    ///
    /// The key is hashed immediately and discarded.
    #[must_use]
    pub fn from_api_key(owner: LibraryOwner, api_key: &str) -> Self {
        Self {
            owner,
            api_key_fingerprint: Self::fingerprint_of(api_key),
        }
    }

    /// Computes the fingerprint of an API key: lowercase hex SHA-256.
    #[must_use]
    pub fn fingerprint_of(api_key: &str) -> String {
        let digest = Sha256::digest(api_key.as_bytes());
        digest.iter().fold(String::with_capacity(64), |mut s, b| {
            use fmt::Write;
            let _ = write!(s, "{b:02x}");
            s
        })
    }

    /// Creates an identity from an owner and a precomputed fingerprint.
    #[must_use]
    pub fn new(owner: LibraryOwner, api_key_fingerprint: impl Into<String>) -> Self {
        Self {
            owner,
            api_key_fingerprint: api_key_fingerprint.into(),
        }
    }

    /// Returns a filesystem-safe slug for this identity.
    ///
    /// Combines the owner with a fingerprint prefix; used by file-backed
    /// cache stores to derive record file names.
    #[must_use]
    pub fn slug(&self) -> String {
        let prefix: String = self.api_key_fingerprint.chars().take(16).collect();
        format!("{}-{}", self.owner, prefix)
    }
}

impl fmt::Display for LibraryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug())
    }
}
