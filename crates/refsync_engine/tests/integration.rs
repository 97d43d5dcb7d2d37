//! Integration tests: full sync cycles against an in-memory remote.

use parking_lot::Mutex;
use refsync_cache::{CacheEntry, CachePolicy, CacheStore, FileCacheStore, MemoryCacheStore};
use refsync_engine::{
    headers, HttpClient, HttpRequest, HttpResponse, RetryConfig, SyncConfig, SyncCoordinator,
    SyncError, SyncPhase, TransportError,
};
use refsync_model::{ItemKey, LibraryOwner, Snapshot};
use refsync_testkit::prelude::*;
use refsync_testkit::Fault;
use std::collections::VecDeque;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, SystemTime};

const OWNER: LibraryOwner = LibraryOwner::User(1);
const API_KEY: &str = "test-key";

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fast_config() -> SyncConfig {
    SyncConfig::new("https://api.example.org", API_KEY)
        .with_page_size(10)
        .with_retry(
            RetryConfig::new(3)
                .with_default_wait(Duration::from_millis(5))
                .with_max_wait(Duration::from_millis(50)),
        )
}

/// A store whose entries are always stale: every request_sync fetches.
fn always_stale() -> MemoryCacheStore {
    MemoryCacheStore::with_policy(CachePolicy::new(Duration::ZERO))
}

fn coordinator(
    remote: &Arc<InMemoryRemote>,
    store: MemoryCacheStore,
) -> SyncCoordinator<Arc<InMemoryRemote>, MemoryCacheStore> {
    SyncCoordinator::new(fast_config(), Arc::clone(remote), store)
}

#[test]
fn full_sync_populates_snapshot_cache_and_tags() {
    init_tracing();
    let remote = Arc::new(InMemoryRemote::with_api_key(API_KEY));
    remote.put_item(&OWNER, article("AAAA1111", &["AI", "Systems"]));
    remote.put_item(&OWNER, article("BBBB2222", &["ai"]));
    remote.put_item(&OWNER, book("CCCC3333"));
    remote.put_item(&OWNER, note("NOTE0001", "AAAA1111"));
    remote.put_item(&OWNER, note("NOTE0002", "GONE0000"));

    let coordinator = coordinator(&remote, always_stale());
    let identity = coordinator.identity(OWNER);

    let snapshot = coordinator.request_sync(&identity).unwrap();
    assert_eq!(snapshot.len(), 5);
    assert_eq!(snapshot.version(), remote.version(&OWNER));
    assert_eq!(snapshot.children().len(), 1);
    assert_eq!(snapshot.orphans().len(), 1);

    // Tag index: "AI" and "ai" fold into one entry with two sources.
    let tags = coordinator.tag_index(&identity).unwrap();
    assert_eq!(tags.len(), 2);
    assert_eq!(tags.get("ai").unwrap().sources.len(), 2);
    assert!(tags.contains("systems"));

    // The snapshot was persisted.
    let entry = coordinator.store().read_stale(&identity).unwrap().unwrap();
    assert_eq!(entry.snapshot, *snapshot);

    let stats = coordinator.stats();
    assert_eq!(stats.cycles_completed, 1);
    assert_eq!(stats.full_fetches, 1);
    assert_eq!(coordinator.phase(&identity), SyncPhase::Idle);
}

#[test]
fn multi_page_fetch_is_ordered_and_counted() {
    let remote = Arc::new(InMemoryRemote::new());
    for item in item_batch(35) {
        remote.put_item(&OWNER, item);
    }

    let coordinator = coordinator(&remote, always_stale());
    let identity = coordinator.identity(OWNER);

    let snapshot = coordinator.request_sync(&identity).unwrap();
    assert_eq!(snapshot.len(), 35);
    // 35 items at page size 10 -> 4 page requests.
    assert_eq!(remote.items_request_count(), 4);

    let keys: Vec<_> = snapshot
        .items()
        .iter()
        .map(|item| item.key.as_str().to_string())
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn second_sync_is_incremental() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.put_item(&OWNER, article("AAAA1111", &[]));
    remote.put_item(&OWNER, article("BBBB2222", &[]));

    let coordinator = coordinator(&remote, always_stale());
    let identity = coordinator.identity(OWNER);
    coordinator.request_sync(&identity).unwrap();

    remote.put_item(&OWNER, article("CCCC3333", &["fresh"]));
    remote.delete_item(&OWNER, &ItemKey::new("AAAA1111"));

    let snapshot = coordinator.request_sync(&identity).unwrap();

    let keys: Vec<_> = snapshot.items().iter().map(|i| i.key.as_str()).collect();
    assert_eq!(keys, vec!["BBBB2222", "CCCC3333"]);
    assert_eq!(snapshot.version(), remote.version(&OWNER));

    let stats = coordinator.stats();
    assert_eq!(stats.full_fetches, 1);
    assert_eq!(stats.incremental_fetches, 1);

    // The rebuilt tag index follows the merged snapshot.
    let tags = coordinator.tag_index(&identity).unwrap();
    assert!(tags.contains("fresh"));
}

#[test]
fn fresh_cache_short_circuits_network() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.put_item(&OWNER, article("AAAA1111", &[]));

    // Default policy: entries stay fresh for days.
    let coordinator = coordinator(&remote, MemoryCacheStore::new());
    let identity = coordinator.identity(OWNER);

    let first = coordinator.request_sync(&identity).unwrap();
    let requests_after_first = remote.request_count();

    let second = coordinator.request_sync(&identity).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(remote.request_count(), requests_after_first);
    assert_eq!(coordinator.stats().cache_hits, 1);
}

#[test]
fn concurrent_requests_share_one_fetch_cycle() {
    let remote = Arc::new(InMemoryRemote::new());
    for item in item_batch(30) {
        remote.put_item(&OWNER, item);
    }
    remote.set_latency(Duration::from_millis(20));

    let coordinator = Arc::new(coordinator(&remote, MemoryCacheStore::new()));
    let identity = coordinator.identity(OWNER);
    let barrier = Arc::new(Barrier::new(2));

    let mut handles = Vec::new();
    for _ in 0..2 {
        let coordinator = Arc::clone(&coordinator);
        let identity = identity.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            coordinator.request_sync(&identity)
        }));
    }

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap().unwrap())
        .collect();

    // Exactly one paginated fetch cycle: 30 items / 10 per page.
    assert_eq!(remote.items_request_count(), 3);
    assert!(Arc::ptr_eq(&results[0], &results[1]));
}

#[test]
fn rate_limited_page_recovers_inside_transport() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.put_item(&OWNER, article("AAAA1111", &[]));
    remote.push_fault(Fault::RateLimited { retry_after: None });

    let coordinator = coordinator(&remote, always_stale());
    let identity = coordinator.identity(OWNER);

    // No error surfaces; the transport absorbed the 429.
    let snapshot = coordinator.request_sync(&identity).unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(coordinator.transport().retry_count(), 1);
    assert_eq!(coordinator.stats().cycles_failed, 0);
}

#[test]
fn persistent_server_errors_exhaust_attempts() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.put_item(&OWNER, article("AAAA1111", &[]));
    for _ in 0..3 {
        remote.push_fault(Fault::ServerError { status: 503 });
    }

    let coordinator = coordinator(&remote, always_stale());
    let identity = coordinator.identity(OWNER);

    let err = coordinator.request_sync(&identity).unwrap_err();
    match err {
        SyncError::Transport(TransportError::AttemptsExhausted { attempts, .. }) => {
            assert_eq!(attempts, 3)
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(coordinator.get_snapshot(&identity).is_none());
    assert_eq!(coordinator.phase(&identity), SyncPhase::Failed);
    assert_eq!(coordinator.stats().cycles_failed, 1);
}

#[test]
fn partial_page_failure_reports_completed_and_failed() {
    let remote = Arc::new(InMemoryRemote::new());
    for item in item_batch(25) {
        remote.put_item(&OWNER, item);
    }
    // Sequential pages: request 3 is page index 2.
    remote.fail_request(3);

    let config = fast_config()
        .with_max_concurrent_pages(1)
        .with_retry(RetryConfig::no_retry());
    let coordinator = SyncCoordinator::new(config, Arc::clone(&remote), always_stale());
    let identity = coordinator.identity(OWNER);

    let err = coordinator.request_sync(&identity).unwrap_err();
    match err {
        SyncError::PartialFetch(partial) => {
            assert_eq!(partial.total_pages, 3);
            assert_eq!(partial.completed, 2);
            assert_eq!(partial.failed[0].page, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn failed_cycle_preserves_previous_snapshot() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.put_item(&OWNER, article("AAAA1111", &[]));

    let config = fast_config().with_retry(RetryConfig::no_retry());
    let coordinator = SyncCoordinator::new(config, Arc::clone(&remote), always_stale());
    let identity = coordinator.identity(OWNER);

    let good = coordinator.request_sync(&identity).unwrap();

    remote.put_item(&OWNER, article("BBBB2222", &[]));
    let next_request = remote.request_count() + 1;
    remote.fail_request(next_request);

    let err = coordinator.request_sync(&identity).unwrap_err();
    assert!(matches!(err, SyncError::Transport(_)));

    // The last good snapshot is still served, untouched.
    let served = coordinator.get_snapshot(&identity).unwrap();
    assert!(Arc::ptr_eq(&good, &served));

    // And the next cycle recovers.
    let recovered = coordinator.request_sync(&identity).unwrap();
    assert_eq!(recovered.len(), 2);
}

#[test]
fn cancel_discards_cycle_between_phases() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.put_item(&OWNER, article("AAAA1111", &[]));
    remote.set_latency(Duration::from_millis(40));

    let coordinator = Arc::new(coordinator(&remote, always_stale()));
    let identity = coordinator.identity(OWNER);

    let handle = {
        let coordinator = Arc::clone(&coordinator);
        let identity = identity.clone();
        thread::spawn(move || coordinator.request_sync(&identity))
    };

    // Wait until the page request is in flight, then cancel: the flag is
    // found at the next phase boundary, after the fetch returns.
    while remote.request_count() == 0 {
        thread::sleep(Duration::from_millis(1));
    }
    coordinator.cancel(&identity);

    let result = handle.join().unwrap();
    assert!(matches!(result, Err(SyncError::Cancelled)));
    assert!(coordinator.get_snapshot(&identity).is_none());
}

#[test]
fn subscribers_see_each_publish_until_dropped() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.put_item(&OWNER, article("AAAA1111", &[]));

    let coordinator = coordinator(&remote, always_stale());
    let identity = coordinator.identity(OWNER);
    let rx = coordinator.subscribe(&identity);

    let first = coordinator.request_sync(&identity).unwrap();
    assert_eq!(rx.recv().unwrap().version(), first.version());

    remote.put_item(&OWNER, article("BBBB2222", &[]));
    let second = coordinator.request_sync(&identity).unwrap();
    assert_eq!(rx.recv().unwrap().version(), second.version());

    // Dropping the receiver unsubscribes; further cycles are unaffected.
    drop(rx);
    remote.put_item(&OWNER, article("CCCC3333", &[]));
    let third = coordinator.request_sync(&identity).unwrap();
    assert_eq!(third.len(), 3);
}

#[test]
fn local_edits_are_batched_reported_and_folded_in() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.put_item(&OWNER, article("AAAA1111", &[]));
    remote.fail_writes_of(&ItemKey::new("CCCC3333"));

    let coordinator = coordinator(&remote, always_stale());
    let identity = coordinator.identity(OWNER);
    coordinator.request_sync(&identity).unwrap();
    let rx = coordinator.subscribe(&identity);

    let unchanged = article("AAAA1111", &[]);
    let edits = vec![unchanged, article("BBBB2222", &["New"]), article("CCCC3333", &[])];
    let report = coordinator.apply_local_edit(&identity, edits).unwrap();

    assert_eq!(report.succeeded, vec![ItemKey::new("BBBB2222")]);
    assert_eq!(report.unchanged, vec![ItemKey::new("AAAA1111")]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, ItemKey::new("CCCC3333"));
    assert_eq!(report.failed[0].1.code, 412);
    assert_eq!(remote.write_request_count(), 1);

    // The accepted edit was merged into the served snapshot and
    // published to subscribers.
    let published = rx.recv_timeout(Duration::from_millis(100)).unwrap();
    assert!(published.contains_key(&ItemKey::new("BBBB2222")));
    assert_eq!(published.version(), remote.version(&OWNER));

    let served = coordinator.get_snapshot(&identity).unwrap();
    assert!(served.contains_key(&ItemKey::new("BBBB2222")));
}

#[test]
fn large_edit_sets_split_into_batches() {
    let remote = Arc::new(InMemoryRemote::new());
    let coordinator = coordinator(&remote, always_stale());
    let identity = coordinator.identity(OWNER);

    let report = coordinator
        .apply_local_edit(&identity, item_batch(120))
        .unwrap();

    assert_eq!(report.succeeded.len(), 120);
    // 120 edits at the remote's 50-record cap -> 3 batches.
    assert_eq!(remote.write_request_count(), 3);
    assert_eq!(remote.item_count(&OWNER), 120);
}

#[test]
fn file_cache_round_trips_across_coordinators() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(InMemoryRemote::new());
    remote.put_item(&OWNER, article("AAAA1111", &["AI"]));

    {
        let store = FileCacheStore::open(dir.path()).unwrap();
        let coordinator = SyncCoordinator::new(fast_config(), Arc::clone(&remote), store);
        let identity = coordinator.identity(OWNER);
        coordinator.request_sync(&identity).unwrap();
    }

    let requests_before = remote.request_count();
    let store = FileCacheStore::open(dir.path()).unwrap();
    let coordinator = SyncCoordinator::new(fast_config(), Arc::clone(&remote), store);
    let identity = coordinator.identity(OWNER);

    // The persisted snapshot serves reads with no network activity.
    let snapshot = coordinator.get_snapshot(&identity).unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(remote.request_count(), requests_before);

    let tags = coordinator.tag_index(&identity).unwrap();
    assert!(tags.contains("ai"));
}

/// A remote that replays canned responses, for scenarios the in-memory
/// remote cannot produce deterministically.
struct ScriptedRemote {
    responses: Mutex<VecDeque<HttpResponse>>,
}

impl ScriptedRemote {
    fn new(responses: Vec<HttpResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

impl HttpClient for ScriptedRemote {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| format!("unexpected request: {}", request.path))
    }
}

#[test]
fn version_drift_between_reads_forces_full_refetch() {
    // The items listing answers at version 6, the deleted listing at
    // version 7: the library moved between the two reads, so the
    // composite delta is untrustworthy and a full refetch follows.
    let item_json = serde_json::to_vec(&vec![article("DDDD4444", &[])]).unwrap();
    let scripted = ScriptedRemote::new(vec![
        HttpResponse::new(200, b"[]".to_vec())
            .with_header(headers::TOTAL_RESULTS, 0)
            .with_header(headers::LAST_MODIFIED_VERSION, 6),
        HttpResponse::new(200, br#"{"items":[]}"#.to_vec())
            .with_header(headers::LAST_MODIFIED_VERSION, 7),
        HttpResponse::new(200, item_json)
            .with_header(headers::TOTAL_RESULTS, 1)
            .with_header(headers::LAST_MODIFIED_VERSION, 7),
    ]);

    let store = always_stale();
    let coordinator = SyncCoordinator::new(fast_config(), scripted, store);
    let identity = coordinator.identity(OWNER);

    // Seed a base snapshot at version 5 so the cycle goes incremental.
    coordinator
        .store()
        .write_entry(CacheEntry::new(
            identity.clone(),
            Snapshot::new(Vec::new(), 5, SystemTime::now()),
        ))
        .unwrap();

    let snapshot = coordinator.request_sync(&identity).unwrap();
    assert_eq!(snapshot.version(), 7);
    assert!(snapshot.contains_key(&ItemKey::new("DDDD4444")));

    let stats = coordinator.stats();
    assert_eq!(stats.conflict_refetches, 1);
    assert_eq!(stats.full_fetches, 1);
    assert_eq!(stats.incremental_fetches, 0);
}
