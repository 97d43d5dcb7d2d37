//! The sync coordinator.
//!
//! Orchestrates transport, paginator, merger and cache store into sync
//! cycles, and exposes the read/subscribe/request API consumers use.
//! The presentation and document-integration layers talk to this type
//! only; they never reach into the transport, paginator or cache store
//! directly.

use crate::api::{self, WriteFailure};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::feed::SnapshotFeed;
use crate::http::HttpClient;
use crate::paginator::Paginator;
use crate::transport::Transport;
use parking_lot::{Condvar, Mutex, RwLock};
use refsync_cache::{CacheError, CacheStore};
use refsync_model::{
    merge, Delta, Item, ItemKey, LibraryIdentity, LibraryOwner, MergeError, Snapshot, TagIndex,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Where a library currently is in its sync lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    /// No cycle is running.
    #[default]
    Idle,
    /// Remote pages are being fetched.
    Fetching,
    /// The fetched delta is being merged.
    Merging,
    /// The merged snapshot is being persisted and published.
    Publishing,
    /// The last cycle failed; the previous snapshot remains served.
    Failed,
}

impl SyncPhase {
    /// Returns true while a cycle is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncPhase::Fetching | SyncPhase::Merging | SyncPhase::Publishing
        )
    }
}

/// Counters describing the coordinator's activity so far.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Sync cycles that completed and published.
    pub cycles_completed: u64,
    /// Sync cycles that failed.
    pub cycles_failed: u64,
    /// Requests served straight from a fresh cache entry.
    pub cache_hits: u64,
    /// Full paginated fetches performed.
    pub full_fetches: u64,
    /// Incremental (since-version) fetches performed.
    pub incremental_fetches: u64,
    /// Pages fetched across all cycles.
    pub pages_fetched: u64,
    /// Items folded into snapshots by merges.
    pub items_merged: u64,
    /// Version conflicts recovered by falling back to a full refetch.
    pub conflict_refetches: u64,
    /// Write batches posted to the remote.
    pub batches_written: u64,
    /// Message of the most recent failure, cleared on success.
    pub last_error: Option<String>,
}

/// Outcome of a batched local-edit write.
#[derive(Debug, Clone, Default)]
pub struct WriteReport {
    /// Keys the remote accepted.
    pub succeeded: Vec<ItemKey>,
    /// Keys that already matched the remote state.
    pub unchanged: Vec<ItemKey>,
    /// Rejected edits with the remote's reason, keyed by the submitted
    /// item's key.
    pub failed: Vec<(ItemKey, WriteFailure)>,
}

struct Published {
    snapshot: Arc<Snapshot>,
    tags: Arc<TagIndex>,
}

#[derive(Default)]
struct InflightCycle {
    outcome: Mutex<Option<SyncResult<Arc<Snapshot>>>>,
    done: Condvar,
}

fn cache_err(error: CacheError) -> SyncError {
    SyncError::Cache(error.to_string())
}

/// Coordinates sync cycles for every library reachable with one API key.
///
/// Constructed from an explicit [`SyncConfig`]; multiple coordinators
/// with distinct keys or remotes can coexist in one process.
///
/// # Concurrency
///
/// At most one sync cycle runs per library identity: a second caller
/// requesting sync while one is in progress blocks until that cycle
/// finishes and receives its outcome, not a duplicate fetch. Cycles for
/// distinct identities proceed independently.
pub struct SyncCoordinator<C: HttpClient, S: CacheStore> {
    config: SyncConfig,
    transport: Transport<C>,
    paginator: Paginator,
    store: S,
    fingerprint: String,
    published: RwLock<HashMap<LibraryIdentity, Published>>,
    feed: SnapshotFeed,
    phases: RwLock<HashMap<LibraryIdentity, SyncPhase>>,
    inflight: Mutex<HashMap<LibraryIdentity, Arc<InflightCycle>>>,
    cancel_requests: Mutex<HashSet<LibraryIdentity>>,
    stats: RwLock<SyncStats>,
}

impl<C: HttpClient, S: CacheStore> SyncCoordinator<C, S> {
    /// Creates a coordinator from a configuration, an HTTP client and a
    /// cache store.
    pub fn new(config: SyncConfig, client: C, store: S) -> Self {
        let transport = Transport::new(
            client,
            config.base_url.clone(),
            config.api_key.clone(),
            config.retry.clone(),
        );
        let paginator = Paginator::new(config.page_size, config.max_concurrent_pages);
        let fingerprint = LibraryIdentity::fingerprint_of(&config.api_key);
        Self {
            config,
            transport,
            paginator,
            store,
            fingerprint,
            published: RwLock::new(HashMap::new()),
            feed: SnapshotFeed::new(),
            phases: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            cancel_requests: Mutex::new(HashSet::new()),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Returns the identity of a library under this coordinator's key.
    #[must_use]
    pub fn identity(&self, owner: LibraryOwner) -> LibraryIdentity {
        LibraryIdentity::new(owner, self.fingerprint.clone())
    }

    /// Returns the transport (read-only, for instrumentation).
    #[must_use]
    pub fn transport(&self) -> &Transport<C> {
        &self.transport
    }

    /// Returns the cache store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns a copy of the current stats.
    #[must_use]
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the current phase of a library's sync lifecycle.
    #[must_use]
    pub fn phase(&self, identity: &LibraryIdentity) -> SyncPhase {
        self.phases.read().get(identity).copied().unwrap_or_default()
    }

    /// Serves the current snapshot without any network activity.
    ///
    /// Returns the published in-memory value if one exists, otherwise
    /// falls back to a fresh cache read. `None` means no usable local
    /// data; call [`SyncCoordinator::request_sync`] to populate.
    #[must_use]
    pub fn get_snapshot(&self, identity: &LibraryIdentity) -> Option<Arc<Snapshot>> {
        if let Some(published) = self.published.read().get(identity) {
            return Some(Arc::clone(&published.snapshot));
        }
        match self.store.read(identity) {
            Ok(Some(entry)) => Some(self.install(identity, entry.snapshot)),
            Ok(None) => None,
            Err(error) => {
                warn!(identity = %identity, %error, "cache read failed; reporting absent");
                None
            }
        }
    }

    /// Returns the tag index derived from the current snapshot.
    #[must_use]
    pub fn tag_index(&self, identity: &LibraryIdentity) -> Option<Arc<TagIndex>> {
        self.get_snapshot(identity)?;
        self.published
            .read()
            .get(identity)
            .map(|published| Arc::clone(&published.tags))
    }

    /// Subscribes to snapshots published for a library.
    ///
    /// Drop the receiver to unsubscribe; an in-flight cycle still
    /// completes so the cache stays consistent for other callers.
    pub fn subscribe(&self, identity: &LibraryIdentity) -> Receiver<Arc<Snapshot>> {
        self.feed.subscribe(identity)
    }

    /// Requests cancellation of the identity's current cycle.
    ///
    /// Checked between cycle phases; already-issued page requests are
    /// never aborted mid-flight. A cancelled cycle reports
    /// [`SyncError::Cancelled`] and discards its partial data.
    pub fn cancel(&self, identity: &LibraryIdentity) {
        self.cancel_requests.lock().insert(identity.clone());
    }

    /// Runs (or joins) a sync cycle and returns the resulting snapshot.
    ///
    /// Cache-first: a fresh cache entry short-circuits without touching
    /// the network. A stale-or-absent cache triggers an incremental
    /// fetch where a base snapshot exists, a full paginated fetch
    /// otherwise. Version conflicts are recovered internally by a full
    /// refetch. On failure the previously served snapshot stays intact.
    pub fn request_sync(&self, identity: &LibraryIdentity) -> SyncResult<Arc<Snapshot>> {
        self.check_identity(identity)?;

        let (cycle, leader) = {
            let mut inflight = self.inflight.lock();
            match inflight.get(identity) {
                Some(cycle) => (Arc::clone(cycle), false),
                None => {
                    let cycle = Arc::new(InflightCycle::default());
                    inflight.insert(identity.clone(), Arc::clone(&cycle));
                    (cycle, true)
                }
            }
        };

        if !leader {
            debug!(identity = %identity, "joining in-flight sync cycle");
            let mut outcome = cycle.outcome.lock();
            loop {
                if let Some(result) = outcome.as_ref() {
                    return result.clone();
                }
                cycle.done.wait(&mut outcome);
            }
        }

        let result = self.run_cycle(identity);

        {
            let mut outcome = cycle.outcome.lock();
            *outcome = Some(result.clone());
            cycle.done.notify_all();
        }
        self.inflight.lock().remove(identity);
        result
    }

    /// Pushes local edits to the remote in batches and folds accepted
    /// edits into the served snapshot.
    ///
    /// Batches respect the remote's per-call record limit. Each batch's
    /// response maps batch-relative indices to accepted keys, unchanged
    /// keys, or failure reasons; the report aggregates them. Accepted
    /// edits are merged into the current snapshot at the server-returned
    /// version, persisted, and published.
    pub fn apply_local_edit(
        &self,
        identity: &LibraryIdentity,
        edits: Vec<Item>,
    ) -> SyncResult<WriteReport> {
        self.check_identity(identity)?;
        if edits.is_empty() {
            return Ok(WriteReport::default());
        }

        let owner = identity.owner;
        let mut report = WriteReport::default();
        let mut accepted: Vec<Item> = Vec::new();
        let mut library_version = 0u64;

        for batch in edits.chunks(self.config.write_batch_size) {
            let request = api::write_request(&owner, batch).map_err(SyncError::Transport)?;
            let response = self.transport.send(&request).map_err(SyncError::Transport)?;
            let parsed = api::parse_write(&response).map_err(SyncError::Transport)?;
            library_version = library_version.max(parsed.library_version);
            self.stats.write().batches_written += 1;

            for (index, item) in batch.iter().enumerate() {
                if let Some(key) = parsed.success.get(&index) {
                    let mut written = item.clone();
                    written.key = key.clone();
                    written.version = parsed.library_version;
                    report.succeeded.push(key.clone());
                    accepted.push(written);
                } else if let Some(key) = parsed.unchanged.get(&index) {
                    report.unchanged.push(key.clone());
                } else if let Some(failure) = parsed.failed.get(&index) {
                    report.failed.push((item.key.clone(), failure.clone()));
                } else {
                    report.failed.push((
                        item.key.clone(),
                        WriteFailure {
                            code: 0,
                            message: "index missing from write response".to_string(),
                        },
                    ));
                }
            }
        }

        if !accepted.is_empty() {
            self.fold_in_edits(identity, accepted, library_version)?;
        }
        info!(
            identity = %identity,
            succeeded = report.succeeded.len(),
            unchanged = report.unchanged.len(),
            failed = report.failed.len(),
            "local edits written"
        );
        Ok(report)
    }

    fn fold_in_edits(
        &self,
        identity: &LibraryIdentity,
        accepted: Vec<Item>,
        library_version: u64,
    ) -> SyncResult<()> {
        let base = self
            .merge_base(identity)?
            .unwrap_or_else(|| Snapshot::empty(SystemTime::UNIX_EPOCH));
        let delta = Delta {
            base_version: base.version(),
            to_version: library_version.max(base.version()),
            modified: accepted,
            deleted: BTreeSet::new(),
        };
        match merge(&base, &delta, SystemTime::now()) {
            Ok(snapshot) => {
                self.stats.write().items_merged += delta.modified.len() as u64;
                self.store
                    .write(identity, snapshot.clone())
                    .map_err(cache_err)?;
                self.publish(identity, snapshot);
                Ok(())
            }
            Err(MergeError::VersionConflict { .. }) => {
                // The remote answered with a version behind our base;
                // drop the cached record so the next sync refetches.
                warn!(identity = %identity, "write merge conflict; invalidating cache");
                self.stats.write().conflict_refetches += 1;
                self.store.invalidate(identity).map_err(cache_err)?;
                Ok(())
            }
        }
    }

    fn check_identity(&self, identity: &LibraryIdentity) -> SyncResult<()> {
        if identity.api_key_fingerprint == self.fingerprint {
            Ok(())
        } else {
            Err(SyncError::ForeignIdentity {
                identity: identity.slug(),
            })
        }
    }

    fn set_phase(&self, identity: &LibraryIdentity, phase: SyncPhase) {
        self.phases.write().insert(identity.clone(), phase);
    }

    fn check_cancelled(&self, identity: &LibraryIdentity) -> SyncResult<()> {
        if self.cancel_requests.lock().remove(identity) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// The previous snapshot an incremental fetch is based on: the
    /// published value if present, else the cached record (stale records
    /// are fine here; only their version matters).
    fn merge_base(&self, identity: &LibraryIdentity) -> SyncResult<Option<Snapshot>> {
        if let Some(published) = self.published.read().get(identity) {
            return Ok(Some((*published.snapshot).clone()));
        }
        Ok(self
            .store
            .read_stale(identity)
            .map_err(cache_err)?
            .map(|entry| entry.snapshot))
    }

    fn run_cycle(&self, identity: &LibraryIdentity) -> SyncResult<Arc<Snapshot>> {
        // A cancel requested before the cycle starts does not apply to it.
        self.cancel_requests.lock().remove(identity);
        self.set_phase(identity, SyncPhase::Fetching);

        let result = self.run_cycle_inner(identity);
        match &result {
            Ok(snapshot) => {
                self.set_phase(identity, SyncPhase::Idle);
                let mut stats = self.stats.write();
                stats.cycles_completed += 1;
                stats.last_error = None;
                info!(identity = %identity, version = snapshot.version(), "sync cycle complete");
            }
            Err(error) => {
                self.set_phase(identity, SyncPhase::Failed);
                let mut stats = self.stats.write();
                stats.cycles_failed += 1;
                stats.last_error = Some(error.to_string());
                warn!(
                    identity = %identity,
                    %error,
                    "sync cycle failed; previous snapshot remains served"
                );
            }
        }
        result
    }

    fn run_cycle_inner(&self, identity: &LibraryIdentity) -> SyncResult<Arc<Snapshot>> {
        // Fresh cache entry: serve it without touching the network.
        if let Some(entry) = self.store.read(identity).map_err(cache_err)? {
            self.stats.write().cache_hits += 1;
            if let Some(published) = self.published.read().get(identity) {
                if published.snapshot.version() >= entry.snapshot.version() {
                    return Ok(Arc::clone(&published.snapshot));
                }
            }
            debug!(identity = %identity, "cache fresh; serving without network");
            return Ok(self.install(identity, entry.snapshot));
        }

        let base = self.merge_base(identity)?;
        self.check_cancelled(identity)?;

        let snapshot = match base {
            Some(base) => self.incremental_cycle(identity, &base)?,
            None => self.full_cycle(identity)?,
        };

        self.check_cancelled(identity)?;
        self.set_phase(identity, SyncPhase::Publishing);
        self.store
            .write(identity, snapshot.clone())
            .map_err(cache_err)?;
        Ok(self.publish(identity, snapshot))
    }

    fn full_cycle(&self, identity: &LibraryIdentity) -> SyncResult<Snapshot> {
        let set = self
            .paginator
            .fetch_items(&self.transport, &identity.owner, None)?;
        {
            let mut stats = self.stats.write();
            stats.full_fetches += 1;
            stats.pages_fetched += set.pages as u64;
        }

        self.check_cancelled(identity)?;
        self.set_phase(identity, SyncPhase::Merging);

        // Folding through the merger deduplicates keys if the remote
        // repeated an item across page boundaries mid-pagination.
        let item_count = set.items.len();
        let delta = Delta::new(0, set.library_version).with_modified(set.items);
        let empty = Snapshot::empty(SystemTime::UNIX_EPOCH);
        let snapshot = merge(&empty, &delta, SystemTime::now())?;
        self.stats.write().items_merged += item_count as u64;
        Ok(snapshot)
    }

    fn incremental_cycle(
        &self,
        identity: &LibraryIdentity,
        base: &Snapshot,
    ) -> SyncResult<Snapshot> {
        let owner = identity.owner;
        let since = base.version();

        let set = self
            .paginator
            .fetch_items(&self.transport, &owner, Some(since))?;
        let deleted_response = self
            .transport
            .send(&api::deleted_request(&owner, since))
            .map_err(SyncError::Transport)?;
        let (deleted, deleted_version) =
            api::parse_deleted(&deleted_response).map_err(SyncError::Transport)?;

        if set.library_version != deleted_version {
            // The library moved between the two reads; the composite
            // delta cannot be trusted.
            warn!(
                identity = %identity,
                items_version = set.library_version,
                deleted_version,
                "library moved mid-fetch; forcing full refetch"
            );
            self.stats.write().conflict_refetches += 1;
            return self.full_cycle(identity);
        }

        self.check_cancelled(identity)?;
        self.set_phase(identity, SyncPhase::Merging);
        {
            let mut stats = self.stats.write();
            stats.incremental_fetches += 1;
            stats.pages_fetched += set.pages as u64;
        }

        let changes = set.items.len() + deleted.len();
        let delta = Delta {
            base_version: since,
            to_version: set.library_version,
            modified: set.items,
            deleted,
        };
        match merge(base, &delta, SystemTime::now()) {
            Ok(snapshot) => {
                self.stats.write().items_merged += changes as u64;
                Ok(snapshot)
            }
            Err(MergeError::VersionConflict { .. }) => {
                warn!(identity = %identity, "delta base conflict; forcing full refetch");
                self.stats.write().conflict_refetches += 1;
                self.full_cycle(identity)
            }
        }
    }

    /// Publishes a snapshot: tag index rebuild, in-memory install, feed
    /// delivery.
    fn publish(&self, identity: &LibraryIdentity, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = self.install(identity, snapshot);
        self.feed.publish(identity, Arc::clone(&snapshot));
        snapshot
    }

    /// Installs a snapshot into the in-memory published map without
    /// notifying subscribers (used for cache loads, which carry no new
    /// remote state).
    fn install(&self, identity: &LibraryIdentity, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        let tags = Arc::new(TagIndex::from_items(snapshot.items()));
        self.published.write().insert(
            identity.clone(),
            Published {
                snapshot: Arc::clone(&snapshot),
                tags,
            },
        );
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpRequest, HttpResponse};
    use refsync_cache::MemoryCacheStore;

    /// A client for tests that never expect network traffic.
    struct NoTrafficClient;

    impl HttpClient for NoTrafficClient {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
            panic!("unexpected network request: {}", request.path);
        }
    }

    fn coordinator() -> SyncCoordinator<NoTrafficClient, MemoryCacheStore> {
        SyncCoordinator::new(
            SyncConfig::new("https://api.example.org", "key"),
            NoTrafficClient,
            MemoryCacheStore::new(),
        )
    }

    #[test]
    fn initial_state() {
        let coordinator = coordinator();
        let identity = coordinator.identity(LibraryOwner::User(1));

        assert_eq!(coordinator.phase(&identity), SyncPhase::Idle);
        assert_eq!(coordinator.stats().cycles_completed, 0);
        assert!(coordinator.get_snapshot(&identity).is_none());
        assert!(coordinator.tag_index(&identity).is_none());
    }

    #[test]
    fn foreign_identity_is_rejected() {
        let coordinator = coordinator();
        let foreign = LibraryIdentity::from_api_key(LibraryOwner::User(1), "someone-elses-key");

        let err = coordinator.request_sync(&foreign).unwrap_err();
        assert!(matches!(err, SyncError::ForeignIdentity { .. }));

        let err = coordinator.apply_local_edit(&foreign, Vec::new()).unwrap_err();
        assert!(matches!(err, SyncError::ForeignIdentity { .. }));
    }

    #[test]
    fn identity_matches_configured_key() {
        let coordinator = coordinator();
        let identity = coordinator.identity(LibraryOwner::Group(9));
        assert_eq!(
            identity,
            LibraryIdentity::from_api_key(LibraryOwner::Group(9), "key")
        );
    }

    #[test]
    fn empty_edit_batch_is_a_noop() {
        let coordinator = coordinator();
        let identity = coordinator.identity(LibraryOwner::User(1));

        let report = coordinator.apply_local_edit(&identity, Vec::new()).unwrap();
        assert!(report.succeeded.is_empty());
        assert!(report.failed.is_empty());
    }

    #[test]
    fn get_snapshot_serves_fresh_cache_without_network() {
        let store = MemoryCacheStore::new();
        let config = SyncConfig::new("https://api.example.org", "key");
        let identity = LibraryIdentity::from_api_key(LibraryOwner::User(1), "key");
        store
            .write(&identity, Snapshot::new(Vec::new(), 8, SystemTime::now()))
            .unwrap();

        let coordinator = SyncCoordinator::new(config, NoTrafficClient, store);
        let snapshot = coordinator.get_snapshot(&identity).unwrap();
        assert_eq!(snapshot.version(), 8);

        // Second read is served from the in-memory install.
        assert!(coordinator.get_snapshot(&identity).is_some());
    }

    #[test]
    fn phase_classification() {
        assert!(SyncPhase::Fetching.is_active());
        assert!(SyncPhase::Merging.is_active());
        assert!(SyncPhase::Publishing.is_active());
        assert!(!SyncPhase::Idle.is_active());
        assert!(!SyncPhase::Failed.is_active());
    }
}
