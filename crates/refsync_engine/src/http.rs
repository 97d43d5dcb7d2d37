//! HTTP abstraction.
//!
//! The engine never bundles a concrete HTTP library. Implement
//! [`HttpClient`] over whichever client the host application uses
//! (reqwest, ureq, a platform webview, ...); tests drive the engine
//! through an in-memory implementation.

use std::fmt;

/// Well-known header names of the remote API.
pub mod headers {
    /// Total number of matching records for a paginated request.
    pub const TOTAL_RESULTS: &str = "Total-Results";
    /// Current library version, present on every response.
    pub const LAST_MODIFIED_VERSION: &str = "Last-Modified-Version";
    /// Server-directed wait in seconds on 429/5xx responses.
    pub const RETRY_AFTER: &str = "Retry-After";
    /// Credential header applied by the transport.
    pub const AUTHORIZATION: &str = "Authorization";
}

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Read request.
    Get,
    /// Batched write request.
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// A request to the remote API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Path below the base URL, starting with `/`.
    pub path: String,
    /// Query parameters in order.
    pub query: Vec<(String, String)>,
    /// Headers in order. The transport appends authorization.
    pub headers: Vec<(String, String)>,
    /// Request body, if any.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Creates a GET request for a path.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Creates a POST request for a path with a body.
    pub fn post(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Looks up a query parameter by name.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A response from the remote API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
        }
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.headers.push((name.into(), value.to_string()));
        self
    }

    /// Looks up a header by name, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parses an integer-valued header.
    #[must_use]
    pub fn header_u64(&self, name: &str) -> Option<u64> {
        self.header(name).and_then(|v| v.trim().parse().ok())
    }

    /// Returns true for a 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The HTTP client the engine drives.
///
/// Implementations handle connection management and per-request timeouts
/// (every call must return in bounded time). The transport layer on top
/// handles authentication and retries; implementations must not retry
/// internally.
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the raw response.
    ///
    /// # Errors
    ///
    /// A string describing the network-level failure. Protocol-level
    /// failures (4xx/5xx) are *successful* calls here; classification
    /// happens in the transport.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, String>;
}

impl<T: HttpClient + ?Sized> HttpClient for std::sync::Arc<T> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
        (**self).send(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder() {
        let request = HttpRequest::get("/users/1/items")
            .with_query("limit", 100)
            .with_query("start", 200);

        assert_eq!(request.method, Method::Get);
        assert_eq!(request.query_param("limit"), Some("100"));
        assert_eq!(request.query_param("start"), Some("200"));
        assert_eq!(request.query_param("since"), None);
    }

    #[test]
    fn response_header_lookup_is_case_insensitive() {
        let response = HttpResponse::new(200, Vec::new())
            .with_header("Total-Results", 513)
            .with_header("Last-Modified-Version", 42);

        assert_eq!(response.header_u64("total-results"), Some(513));
        assert_eq!(response.header_u64(headers::LAST_MODIFIED_VERSION), Some(42));
        assert_eq!(response.header("X-Missing"), None);
    }

    #[test]
    fn success_classification() {
        assert!(HttpResponse::new(200, Vec::new()).is_success());
        assert!(HttpResponse::new(204, Vec::new()).is_success());
        assert!(!HttpResponse::new(304, Vec::new()).is_success());
        assert!(!HttpResponse::new(429, Vec::new()).is_success());
    }
}
