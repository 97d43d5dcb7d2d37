//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration for a sync coordinator.
///
/// Everything the engine needs is passed in here at construction; there
/// is no process-global client state. Independent coordinators (distinct
/// API keys, distinct remotes) can coexist in one process.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the remote API (e.g. `https://api.example.org`).
    pub base_url: String,
    /// API key applied to every request.
    pub api_key: String,
    /// Items per page for paginated fetches.
    pub page_size: usize,
    /// Maximum concurrently in-flight page requests.
    pub max_concurrent_pages: usize,
    /// Maximum records per batched write request.
    pub write_batch_size: usize,
    /// Retry behavior for rate-limited and server-error responses.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration with default tuning.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            page_size: 100,
            max_concurrent_pages: 5,
            write_batch_size: 50,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sets the concurrent page-request limit.
    #[must_use]
    pub fn with_max_concurrent_pages(mut self, limit: usize) -> Self {
        self.max_concurrent_pages = limit.max(1);
        self
    }

    /// Sets the write batch size.
    #[must_use]
    pub fn with_write_batch_size(mut self, size: usize) -> Self {
        self.write_batch_size = size.clamp(1, 50);
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Configuration for transport-level retry behavior.
///
/// The remote directs the wait: a 429/5xx response may carry a
/// `Retry-After` hint in seconds. Absent a hint the default wait applies,
/// and every wait is clamped to `max_wait`. The attempt cap bounds the
/// total number of issues of one request; retrying forever against a
/// persistently failing endpoint is treated as a bug here, not a feature.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts per request (first try included).
    pub max_attempts: u32,
    /// Wait applied when the server provides no hint.
    pub default_wait: Duration,
    /// Upper bound on any single wait, server-directed or not.
    pub max_wait: Duration,
}

impl RetryConfig {
    /// Creates a retry configuration with the given attempt cap.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            default_wait: Duration::from_secs(10),
            max_wait: Duration::from_secs(60),
        }
    }

    /// Creates a configuration that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            default_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
        }
    }

    /// Sets the default wait.
    #[must_use]
    pub fn with_default_wait(mut self, wait: Duration) -> Self {
        self.default_wait = wait;
        self
    }

    /// Sets the maximum wait.
    #[must_use]
    pub fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }

    /// Resolves the wait for a response hint, clamped to the maximum.
    #[must_use]
    pub fn wait_for_hint(&self, retry_after_secs: Option<u64>) -> Duration {
        let wait = retry_after_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_wait);
        wait.min(self.max_wait)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(5)
    }
}
