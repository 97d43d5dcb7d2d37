//! # Refsync Engine
//!
//! Library synchronization engine for refsync.
//!
//! This crate provides:
//! - HTTP transport abstraction with server-directed backoff and a retry cap
//! - Bounded-concurrency pagination with deterministic page ordering
//! - The sync coordinator: cache-aware sync cycles, at-most-one in-flight
//!   sync per library identity, snapshot publication to subscribers
//! - Batched local-edit writes against the remote
//!
//! ## Architecture
//!
//! A sync cycle is **cache-first**: a fresh cache entry is served without
//! touching the network. When the cache is stale, the coordinator fetches
//! incrementally against the previous snapshot version where one exists
//! (falling back to a full paginated fetch on version conflicts) and only
//! then persists and publishes, so consumers never observe a half-merged
//! snapshot.
//!
//! ## Key Invariants
//!
//! - Retryable remote responses (429/5xx) are recovered inside the
//!   transport, up to a bounded attempt cap
//! - At most one sync cycle is in flight per library identity; concurrent
//!   requesters join the in-progress cycle and observe its outcome
//! - A failed cycle leaves the previously published snapshot served and
//!   the cache untouched

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod api;
mod config;
mod coordinator;
mod error;
mod feed;
mod http;
mod paginator;
mod transport;

pub use api::{WriteFailure, WriteResponse};
pub use config::{RetryConfig, SyncConfig};
pub use coordinator::{SyncCoordinator, SyncPhase, SyncStats, WriteReport};
pub use error::{
    FetchError, PageFailure, PartialFetchError, SyncError, SyncResult, TransportError,
};
pub use feed::SnapshotFeed;
pub use http::{headers, HttpClient, HttpRequest, HttpResponse, Method};
pub use paginator::{FetchedSet, Paginator};
pub use transport::Transport;
