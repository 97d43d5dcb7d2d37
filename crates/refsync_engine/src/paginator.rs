//! Bounded-concurrency pagination.

use crate::api::{self, PageData};
use crate::error::{FetchError, PageFailure, PartialFetchError, TransportError};
use crate::http::HttpClient;
use crate::transport::Transport;
use parking_lot::Mutex;
use refsync_model::{Item, LibraryOwner};
use std::collections::HashMap;
use std::thread;
use tracing::debug;

/// The assembled result of a paginated fetch.
#[derive(Debug, Clone)]
pub struct FetchedSet {
    /// All items in page order.
    pub items: Vec<Item>,
    /// The library version reported while fetching (highest seen, so a
    /// remote that moved mid-fetch is never understated).
    pub library_version: u64,
    /// Number of pages fetched.
    pub pages: usize,
}

/// Fetches every page of an items listing under a concurrency bound.
///
/// The first page is issued alone to learn the total count; the
/// remaining pages are fetched by a fixed pool of workers pulling page
/// indices off a shared queue. Bounded fan-out rather than one request
/// per page at once keeps the remote rate limiter happy and bounds peak
/// memory. Results are assembled by page index, so output order is
/// deterministic regardless of network timing.
#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    page_size: usize,
    max_concurrent: usize,
}

impl Paginator {
    /// Creates a paginator.
    #[must_use]
    pub fn new(page_size: usize, max_concurrent: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Fetches all items of a library, optionally restricted to changes
    /// since a version.
    ///
    /// # Errors
    ///
    /// [`FetchError::Transport`] if the initial page fails outright;
    /// [`FetchError::Partial`] if any later page fails after the
    /// transport's retries are exhausted.
    pub fn fetch_items<C: HttpClient>(
        &self,
        transport: &Transport<C>,
        owner: &LibraryOwner,
        since: Option<u64>,
    ) -> Result<FetchedSet, FetchError> {
        let first = self.fetch_page(transport, owner, since, 0)?;
        let total = first.total as usize;
        let total_pages = total.div_ceil(self.page_size).max(1);

        debug!(
            owner = %owner,
            total,
            total_pages,
            since,
            "paginated fetch started"
        );

        let mut items = first.items;
        let mut library_version = first.library_version;

        if total_pages > 1 {
            let pending = Mutex::new((1..total_pages).rev().collect::<Vec<usize>>());
            let fetched: Mutex<HashMap<usize, Result<PageData, TransportError>>> =
                Mutex::new(HashMap::new());
            let workers = self.max_concurrent.min(total_pages - 1);

            thread::scope(|scope| {
                for _ in 0..workers {
                    scope.spawn(|| loop {
                        let page = match pending.lock().pop() {
                            Some(page) => page,
                            None => break,
                        };
                        let result = self.fetch_page(transport, owner, since, page);
                        fetched.lock().insert(page, result);
                    });
                }
            });

            let mut fetched = fetched.into_inner();
            let mut failed = Vec::new();
            for page in 1..total_pages {
                match fetched.remove(&page) {
                    Some(Ok(data)) => {
                        library_version = library_version.max(data.library_version);
                        items.extend(data.items);
                    }
                    Some(Err(error)) => failed.push(PageFailure { page, error }),
                    None => failed.push(PageFailure {
                        page,
                        error: TransportError::Network("page was never fetched".to_string()),
                    }),
                }
            }

            if !failed.is_empty() {
                return Err(PartialFetchError {
                    completed: total_pages - failed.len(),
                    total_pages,
                    failed,
                }
                .into());
            }
        }

        debug!(owner = %owner, items = items.len(), library_version, "paginated fetch complete");
        Ok(FetchedSet {
            items,
            library_version,
            pages: total_pages,
        })
    }

    fn fetch_page<C: HttpClient>(
        &self,
        transport: &Transport<C>,
        owner: &LibraryOwner,
        since: Option<u64>,
        page: usize,
    ) -> Result<PageData, TransportError> {
        let request = api::items_request(owner, page * self.page_size, self.page_size, since);
        let response = transport.send(&request)?;
        api::parse_items(&response)
    }
}
