//! Retrying transport over an [`HttpClient`].

use crate::config::RetryConfig;
use crate::error::TransportError;
use crate::http::{headers, HttpClient, HttpRequest, HttpResponse};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use tracing::{debug, warn};

/// Issues requests to the remote API, applying authentication and
/// recovering from rate-limited and server-error responses.
///
/// On a 429 or 5xx response the transport reads the server's
/// `Retry-After` hint (seconds; absent means the configured default),
/// sleeps for that long and re-issues the identical request. Network
/// failures are treated the same way. Attempts are capped: once the
/// budget is spent the last error surfaces as
/// [`TransportError::AttemptsExhausted`]. Other 4xx responses propagate
/// immediately without retry.
pub struct Transport<C: HttpClient> {
    client: C,
    base_url: String,
    api_key: String,
    retry: RetryConfig,
    retries: AtomicU64,
}

impl<C: HttpClient> Transport<C> {
    /// Creates a transport.
    pub fn new(
        client: C,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            retry,
            retries: AtomicU64::new(0),
        }
    }

    /// Returns the base URL requests are issued against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the underlying HTTP client.
    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the total number of retries performed so far.
    #[must_use]
    pub fn retry_count(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    fn prepare(&self, request: &HttpRequest) -> HttpRequest {
        let mut outgoing = request.clone();
        outgoing.path = format!("{}{}", self.base_url, request.path);
        outgoing.headers.push((
            headers::AUTHORIZATION.to_string(),
            format!("Bearer {}", self.api_key),
        ));
        outgoing
    }

    /// Sends a request, retrying per the configured policy.
    ///
    /// # Errors
    ///
    /// [`TransportError::ClientError`] immediately on a non-retryable 4xx,
    /// [`TransportError::AttemptsExhausted`] once the retry budget is
    /// spent on 429/5xx/network failures.
    pub fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut last: Option<(TransportError, Option<u64>)> = None;

        for attempt in 1..=self.retry.max_attempts {
            if let Some((error, hint)) = &last {
                let wait = self.retry.wait_for_hint(*hint);
                warn!(
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    %error,
                    method = %request.method,
                    path = %request.path,
                    "retryable failure; backing off"
                );
                thread::sleep(wait);
                self.retries.fetch_add(1, Ordering::Relaxed);
            }

            let outgoing = self.prepare(request);
            match self.client.send(&outgoing) {
                Err(message) => {
                    last = Some((TransportError::Network(message), None));
                }
                Ok(response) if response.is_success() => {
                    debug!(
                        method = %request.method,
                        path = %request.path,
                        status = response.status,
                        attempt,
                        "request completed"
                    );
                    return Ok(response);
                }
                Ok(response) => {
                    let hint = response.header_u64(headers::RETRY_AFTER);
                    match response.status {
                        429 => {
                            last = Some((TransportError::RateLimited { retry_after: hint }, hint));
                        }
                        status @ 500..=599 => {
                            last = Some((TransportError::ServerError { status }, hint));
                        }
                        status => {
                            return Err(TransportError::ClientError {
                                status,
                                message: String::from_utf8_lossy(&response.body).into_owned(),
                            });
                        }
                    }
                }
            }
        }

        let last_error = last
            .map(|(error, _)| error)
            .unwrap_or_else(|| TransportError::Network("no attempts made".to_string()));
        Err(TransportError::AttemptsExhausted {
            attempts: self.retry.max_attempts,
            last: Box::new(last_error),
        })
    }
}
