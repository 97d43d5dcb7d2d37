//! An in-memory remote library server.
//!
//! Implements the engine's [`HttpClient`] trait directly, so a
//! coordinator can run full sync cycles without network overhead.
//! Supports fault injection (rate limits, server errors) and request
//! counting for concurrency assertions.

use parking_lot::Mutex;
use refsync_engine::{headers, HttpClient, HttpRequest, HttpResponse, Method};
use refsync_model::{Item, ItemKey, LibraryOwner};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A scripted failure served before the remote's real answer.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Answer 429, optionally with a `Retry-After` hint in seconds.
    RateLimited {
        /// The hint, if any.
        retry_after: Option<u64>,
    },
    /// Answer with a server error status.
    ServerError {
        /// The 5xx status to serve.
        status: u16,
    },
    /// Fail at the connection level.
    Disconnect,
}

#[derive(Debug, Default)]
struct LibraryState {
    version: u64,
    items: Vec<Item>,
    deleted: Vec<(ItemKey, u64)>,
}

impl LibraryState {
    fn upsert(&mut self, item: Item) {
        match self.items.iter_mut().find(|existing| existing.key == item.key) {
            Some(existing) => *existing = item,
            None => self.items.push(item),
        }
    }
}

/// An in-memory remote serving the paginated library API.
///
/// Holds one library per owner; all mutators bump that library's
/// version the way the real remote does.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    libraries: Mutex<HashMap<String, LibraryState>>,
    faults: Mutex<VecDeque<Fault>>,
    expected_key: Option<String>,
    fail_write_keys: Mutex<HashSet<ItemKey>>,
    fail_requests: Mutex<HashSet<usize>>,
    latency: Mutex<std::time::Duration>,
    requests: AtomicUsize,
    items_requests: AtomicUsize,
    write_requests: AtomicUsize,
}

impl InMemoryRemote {
    /// Creates a remote that accepts any API key.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a remote that rejects requests not bearing this key.
    #[must_use]
    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            expected_key: Some(key.into()),
            ..Self::default()
        }
    }

    /// Stores an item, bumping the library version.
    pub fn put_item(&self, owner: &LibraryOwner, item: Item) {
        let mut libraries = self.libraries.lock();
        let state = libraries.entry(owner.route_prefix()).or_default();
        state.version += 1;
        let mut item = item;
        item.version = state.version;
        state.upsert(item);
    }

    /// Deletes an item, bumping the library version.
    pub fn delete_item(&self, owner: &LibraryOwner, key: &ItemKey) {
        let mut libraries = self.libraries.lock();
        let state = libraries.entry(owner.route_prefix()).or_default();
        if let Some(position) = state.items.iter().position(|item| &item.key == key) {
            state.items.remove(position);
            state.version += 1;
            let version = state.version;
            state.deleted.push((key.clone(), version));
        }
    }

    /// Returns a library's current version.
    #[must_use]
    pub fn version(&self, owner: &LibraryOwner) -> u64 {
        self.libraries
            .lock()
            .get(&owner.route_prefix())
            .map_or(0, |state| state.version)
    }

    /// Returns a library's current item count.
    #[must_use]
    pub fn item_count(&self, owner: &LibraryOwner) -> usize {
        self.libraries
            .lock()
            .get(&owner.route_prefix())
            .map_or(0, |state| state.items.len())
    }

    /// Queues a fault to be served before real answers resume.
    pub fn push_fault(&self, fault: Fault) {
        self.faults.lock().push_back(fault);
    }

    /// Makes future writes of this key fail with a 412-style rejection.
    pub fn fail_writes_of(&self, key: &ItemKey) {
        self.fail_write_keys.lock().insert(key.clone());
    }

    /// Serves a 500 on the `n`th request (1-based, counting every
    /// request). Deterministic page-failure injection for tests running
    /// with sequential fetches.
    pub fn fail_request(&self, n: usize) {
        self.fail_requests.lock().insert(n);
    }

    /// Adds artificial latency to every request, so overlapping callers
    /// actually overlap.
    pub fn set_latency(&self, latency: std::time::Duration) {
        *self.latency.lock() = latency;
    }

    /// Total requests served (faults included).
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Items-listing requests served.
    #[must_use]
    pub fn items_request_count(&self) -> usize {
        self.items_requests.load(Ordering::SeqCst)
    }

    /// Batched write requests served.
    #[must_use]
    pub fn write_request_count(&self) -> usize {
        self.write_requests.load(Ordering::SeqCst)
    }

    fn handle_items(&self, prefix: &str, request: &HttpRequest) -> HttpResponse {
        self.items_requests.fetch_add(1, Ordering::SeqCst);
        let libraries = self.libraries.lock();
        let state = match libraries.get(prefix) {
            Some(state) => state,
            None => return not_found(),
        };

        let since: Option<u64> = request
            .query_param("since")
            .and_then(|v| v.parse().ok());
        let start: usize = request
            .query_param("start")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let limit: usize = request
            .query_param("limit")
            .and_then(|v| v.parse().ok())
            .unwrap_or(25);

        let matching: Vec<&Item> = state
            .items
            .iter()
            .filter(|item| since.map_or(true, |since| item.version > since))
            .collect();
        let total = matching.len();
        let end = (start + limit).min(total);
        let page = &matching[start.min(total)..end];
        let body = serde_json::to_vec(page).unwrap_or_default();

        HttpResponse::new(200, body)
            .with_header(headers::TOTAL_RESULTS, total)
            .with_header(headers::LAST_MODIFIED_VERSION, state.version)
    }

    fn handle_deleted(&self, prefix: &str, request: &HttpRequest) -> HttpResponse {
        let libraries = self.libraries.lock();
        let state = match libraries.get(prefix) {
            Some(state) => state,
            None => return not_found(),
        };

        let since: u64 = request
            .query_param("since")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let keys: Vec<&str> = state
            .deleted
            .iter()
            .filter(|(_, version)| *version > since)
            .map(|(key, _)| key.as_str())
            .collect();
        let body = serde_json::to_vec(&serde_json::json!({ "items": keys })).unwrap_or_default();

        HttpResponse::new(200, body).with_header(headers::LAST_MODIFIED_VERSION, state.version)
    }

    fn handle_write(&self, prefix: &str, request: &HttpRequest) -> HttpResponse {
        self.write_requests.fetch_add(1, Ordering::SeqCst);
        let batch: Vec<Item> = match request
            .body
            .as_deref()
            .and_then(|body| serde_json::from_slice(body).ok())
        {
            Some(batch) => batch,
            None => return HttpResponse::new(400, b"malformed batch".to_vec()),
        };
        if batch.len() > 50 {
            return HttpResponse::new(400, b"batch too large".to_vec());
        }

        let fail_keys = self.fail_write_keys.lock();
        let mut libraries = self.libraries.lock();
        let state = libraries.entry(prefix.to_string()).or_default();
        let new_version = state.version + 1;

        let mut success = serde_json::Map::new();
        let mut unchanged = serde_json::Map::new();
        let mut failed = serde_json::Map::new();
        let mut accepted = 0usize;

        for (index, item) in batch.into_iter().enumerate() {
            if fail_keys.contains(&item.key) {
                failed.insert(
                    index.to_string(),
                    serde_json::json!({ "code": 412, "message": "write rejected" }),
                );
                continue;
            }

            let same = state.items.iter().any(|existing| {
                existing.key == item.key
                    && existing.item_type == item.item_type
                    && existing.fields == item.fields
                    && existing.tags == item.tags
                    && existing.parent_item == item.parent_item
            });
            if same {
                unchanged.insert(
                    index.to_string(),
                    serde_json::json!(item.key.as_str()),
                );
                continue;
            }

            let mut written = item;
            written.version = new_version;
            success.insert(
                index.to_string(),
                serde_json::json!(written.key.as_str()),
            );
            state.upsert(written);
            accepted += 1;
        }

        if accepted > 0 {
            state.version = new_version;
        }

        let body = serde_json::to_vec(&serde_json::json!({
            "success": success,
            "unchanged": unchanged,
            "failed": failed,
        }))
        .unwrap_or_default();

        HttpResponse::new(200, body).with_header(headers::LAST_MODIFIED_VERSION, state.version)
    }
}

fn not_found() -> HttpResponse {
    HttpResponse::new(404, b"library not found".to_vec())
}

/// Extracts the `(route prefix, endpoint)` pair from a full request URL.
fn parse_route(path: &str) -> Option<(String, String)> {
    let index = path.find("/users/").or_else(|| path.find("/groups/"))?;
    let mut segments = path[index + 1..].split('/');
    let kind = segments.next()?;
    let id = segments.next()?;
    let endpoint = segments.next().unwrap_or("").to_string();
    Some((format!("/{kind}/{id}"), endpoint))
}

impl HttpClient for InMemoryRemote {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
        let sequence = self.requests.fetch_add(1, Ordering::SeqCst) + 1;

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        if self.fail_requests.lock().remove(&sequence) {
            return Ok(HttpResponse::new(500, Vec::new()));
        }

        if let Some(fault) = self.faults.lock().pop_front() {
            return match fault {
                Fault::RateLimited { retry_after } => {
                    let mut response = HttpResponse::new(429, Vec::new());
                    if let Some(seconds) = retry_after {
                        response = response.with_header(headers::RETRY_AFTER, seconds);
                    }
                    Ok(response)
                }
                Fault::ServerError { status } => Ok(HttpResponse::new(status, Vec::new())),
                Fault::Disconnect => Err("connection refused".to_string()),
            };
        }

        if let Some(expected) = &self.expected_key {
            let authorized = request.headers.iter().any(|(name, value)| {
                name.eq_ignore_ascii_case(headers::AUTHORIZATION)
                    && value == &format!("Bearer {expected}")
            });
            if !authorized {
                return Ok(HttpResponse::new(403, b"invalid API key".to_vec()));
            }
        }

        let (prefix, endpoint) = match parse_route(&request.path) {
            Some(route) => route,
            None => return Ok(HttpResponse::new(404, b"no such route".to_vec())),
        };

        let response = match (request.method, endpoint.as_str()) {
            (Method::Get, "items") => self.handle_items(&prefix, request),
            (Method::Get, "deleted") => self.handle_deleted(&prefix, request),
            (Method::Post, "items") => self.handle_write(&prefix, request),
            _ => HttpResponse::new(404, b"no such endpoint".to_vec()),
        };
        Ok(response)
    }
}
