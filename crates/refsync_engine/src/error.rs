//! Error types for the sync engine.

use refsync_model::MergeError;
use thiserror::Error;

/// Result type for coordinator-level operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors reported by the transport layer.
///
/// Rate-limited and server-error responses are retried inside the
/// transport; they appear here only wrapped in
/// [`TransportError::AttemptsExhausted`] once the attempt cap is hit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The remote answered 429.
    #[error("rate limited by remote (retry-after: {retry_after:?}s)")]
    RateLimited {
        /// Server-provided wait hint in seconds, if any.
        retry_after: Option<u64>,
    },

    /// The remote answered with a 5xx status.
    #[error("remote server error (status {status})")]
    ServerError {
        /// HTTP status code.
        status: u16,
    },

    /// The remote rejected the request with a non-retryable 4xx status.
    #[error("remote rejected request (status {status}): {message}")]
    ClientError {
        /// HTTP status code.
        status: u16,
        /// Response body or reason, if any.
        message: String,
    },

    /// The request never produced a usable response: connection failure,
    /// timeout, or a malformed body.
    #[error("network error: {0}")]
    Network(String),

    /// The retry budget was spent without a usable response.
    #[error("gave up after {attempts} attempts: {last}")]
    AttemptsExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The error observed on the final attempt.
        last: Box<TransportError>,
    },
}

impl TransportError {
    /// Returns true if the transport may re-issue the request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::RateLimited { .. }
                | TransportError::ServerError { .. }
                | TransportError::Network(_)
        )
    }
}

/// A single page that could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    /// Zero-based page index.
    pub page: usize,
    /// The error the page ultimately failed with.
    pub error: TransportError,
}

/// One or more pages of a paginated fetch failed after transport retries
/// were exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{completed} of {total_pages} pages fetched; {} failed", .failed.len())]
pub struct PartialFetchError {
    /// Number of pages fetched successfully.
    pub completed: usize,
    /// Total number of pages the fetch required.
    pub total_pages: usize,
    /// The pages that failed, in page order.
    pub failed: Vec<PageFailure>,
}

/// Errors reported by the paginator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The initial page request failed outright.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Some pages failed after retries; others completed.
    #[error(transparent)]
    Partial(#[from] PartialFetchError),
}

/// Cycle-level errors reported to consumers of the coordinator.
///
/// Cloneable so every caller joined to an in-flight cycle receives the
/// same error value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// Transport gave up on a request.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A paginated fetch completed only partially.
    #[error("partial fetch: {0}")]
    PartialFetch(#[from] PartialFetchError),

    /// Merging failed in a way the coordinator could not recover from.
    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    /// The cache store failed.
    #[error("cache error: {0}")]
    Cache(String),

    /// The cycle was cancelled between phases.
    #[error("sync cancelled")]
    Cancelled,

    /// The identity does not belong to this coordinator's API key.
    #[error("identity {identity} does not match this coordinator's API key")]
    ForeignIdentity {
        /// The offending identity slug.
        identity: String,
    },
}

impl From<FetchError> for SyncError {
    fn from(error: FetchError) -> Self {
        match error {
            FetchError::Transport(e) => SyncError::Transport(e),
            FetchError::Partial(e) => SyncError::PartialFetch(e),
        }
    }
}
