//! Request builders and response parsers for the remote API.
//!
//! The remote exposes paginated `GET` endpoints returning JSON arrays
//! plus `Total-Results` / `Last-Modified-Version` headers, a deleted-keys
//! endpoint, and a batched `POST` write endpoint answering with
//! per-index success/unchanged/failed maps.

use crate::error::TransportError;
use crate::http::{headers, HttpRequest, HttpResponse};
use refsync_model::{Item, ItemKey, LibraryOwner};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

/// One parsed page of an items fetch.
#[derive(Debug, Clone)]
pub(crate) struct PageData {
    /// Items on this page, in remote order.
    pub items: Vec<Item>,
    /// Total matching items across all pages.
    pub total: u64,
    /// Library version at the time of this response.
    pub library_version: u64,
}

fn malformed(what: &str, error: impl std::fmt::Display) -> TransportError {
    TransportError::Network(format!("malformed {what}: {error}"))
}

fn library_version(response: &HttpResponse) -> Result<u64, TransportError> {
    response
        .header_u64(headers::LAST_MODIFIED_VERSION)
        .ok_or_else(|| malformed("response", "missing Last-Modified-Version header"))
}

/// Builds a paginated items request.
pub(crate) fn items_request(
    owner: &LibraryOwner,
    start: usize,
    limit: usize,
    since: Option<u64>,
) -> HttpRequest {
    let mut request = HttpRequest::get(format!("{}/items", owner.route_prefix()))
        .with_query("format", "json")
        .with_query("limit", limit)
        .with_query("start", start);
    if let Some(since) = since {
        request = request.with_query("since", since);
    }
    request
}

/// Parses an items page response.
pub(crate) fn parse_items(response: &HttpResponse) -> Result<PageData, TransportError> {
    let items: Vec<Item> =
        serde_json::from_slice(&response.body).map_err(|e| malformed("items body", e))?;
    let total = response
        .header_u64(headers::TOTAL_RESULTS)
        .unwrap_or(items.len() as u64);
    let library_version = library_version(response)?;
    Ok(PageData {
        items,
        total,
        library_version,
    })
}

/// Builds a deleted-keys request.
pub(crate) fn deleted_request(owner: &LibraryOwner, since: u64) -> HttpRequest {
    HttpRequest::get(format!("{}/deleted", owner.route_prefix())).with_query("since", since)
}

#[derive(Debug, Deserialize)]
struct DeletedBody {
    #[serde(default)]
    items: Vec<ItemKey>,
}

/// Parses a deleted-keys response into keys plus the library version.
pub(crate) fn parse_deleted(
    response: &HttpResponse,
) -> Result<(BTreeSet<ItemKey>, u64), TransportError> {
    let body: DeletedBody =
        serde_json::from_slice(&response.body).map_err(|e| malformed("deleted body", e))?;
    let library_version = library_version(response)?;
    Ok((body.items.into_iter().collect(), library_version))
}

/// Builds a batched write request. At most 50 items per call.
pub(crate) fn write_request(
    owner: &LibraryOwner,
    batch: &[Item],
) -> Result<HttpRequest, TransportError> {
    let body = serde_json::to_vec(batch).map_err(|e| malformed("write batch", e))?;
    Ok(HttpRequest::post(format!("{}/items", owner.route_prefix()), body)
        .with_header("Content-Type", "application/json"))
}

/// Why one record of a write batch was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WriteFailure {
    /// Remote error code.
    pub code: u16,
    /// Human-readable reason.
    pub message: String,
}

/// Parsed response of a batched write.
///
/// Maps are keyed by batch-relative index: position `i` refers to the
/// `i`-th item of the submitted batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteResponse {
    /// Indices accepted, with the key the remote stored them under.
    pub success: BTreeMap<usize, ItemKey>,
    /// Indices that matched the stored state and were left untouched.
    pub unchanged: BTreeMap<usize, ItemKey>,
    /// Indices rejected, with the reason.
    pub failed: BTreeMap<usize, WriteFailure>,
    /// Library version after the write.
    pub library_version: u64,
}

#[derive(Debug, Deserialize)]
struct WriteBody {
    #[serde(default)]
    success: BTreeMap<String, ItemKey>,
    #[serde(default)]
    unchanged: BTreeMap<String, ItemKey>,
    #[serde(default)]
    failed: BTreeMap<String, WriteFailure>,
}

fn index_keyed<T>(map: BTreeMap<String, T>, what: &str) -> Result<BTreeMap<usize, T>, TransportError> {
    map.into_iter()
        .map(|(index, value)| {
            index
                .parse::<usize>()
                .map(|index| (index, value))
                .map_err(|e| malformed(what, e))
        })
        .collect()
}

/// Parses a batched write response.
pub(crate) fn parse_write(response: &HttpResponse) -> Result<WriteResponse, TransportError> {
    let body: WriteBody =
        serde_json::from_slice(&response.body).map_err(|e| malformed("write body", e))?;
    let library_version = library_version(response)?;
    Ok(WriteResponse {
        success: index_keyed(body.success, "write success map")?,
        unchanged: index_keyed(body.unchanged, "write unchanged map")?,
        failed: index_keyed(body.failed, "write failed map")?,
        library_version,
    })
}
