//! Response envelope decoding.
//!
//! Two envelope shapes are understood, plus a bare JSON array:
//!
//! ```json
//! {"success": true, "data": [...], "meta": {"pagination": {...}, "total": 42}}
//! {"items": [...], "meta": {"totalItems": 42, "itemsPerPage": 10, "totalPages": 5, "currentPage": 1}}
//! ```
//!
//! When the first shape carries no pagination block the response is taken
//! as the only page.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use gridsync_core::{Page, Pagination, PaginationMeta, SourceError};

#[derive(Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    data: Option<T>,
    #[serde(default)]
    meta: ApiMeta,
    error: Option<ApiError>,
}

#[derive(Default, Deserialize)]
struct ApiMeta {
    pagination: Option<PaginationMeta>,
    total: Option<u64>,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogEnvelope<T> {
    items: Vec<T>,
    meta: CatalogMeta,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogMeta {
    total_items: u64,
    items_per_page: u32,
    total_pages: u32,
    current_page: u32,
}

impl From<CatalogMeta> for PaginationMeta {
    fn from(meta: CatalogMeta) -> Self {
        PaginationMeta {
            page: meta.current_page,
            limit: meta.items_per_page,
            total: meta.total_items,
            total_pages: Some(meta.total_pages),
            has_next: Some(meta.current_page < meta.total_pages),
            has_prev: Some(meta.current_page > 1),
        }
    }
}

fn decode_error(err: serde_json::Error) -> SourceError {
    SourceError::Decode(err.to_string())
}

fn parse(body: &[u8]) -> Result<Value, SourceError> {
    serde_json::from_slice(body).map_err(decode_error)
}

fn failure(error: Option<ApiError>) -> SourceError {
    let message = match error {
        Some(e) if e.code.is_empty() => e.message,
        Some(e) => format!("{}: {}", e.code, e.message),
        None => "request failed".to_string(),
    };
    SourceError::Decode(format!("server reported failure: {}", message))
}

/// Decode one page of rows fetched with `requested`.
pub fn decode_page<T: DeserializeOwned>(
    body: &[u8],
    requested: Pagination,
) -> Result<Page<T>, SourceError> {
    let value = parse(body)?;

    if value.is_array() {
        let rows: Vec<T> = serde_json::from_value(value).map_err(decode_error)?;
        let total = rows.len() as u64;
        return Ok(Page::new(rows, PaginationMeta::single_page(requested, total)));
    }

    if value.get("success").is_some() {
        let envelope: ApiEnvelope<Vec<T>> = serde_json::from_value(value).map_err(decode_error)?;
        if !envelope.success {
            return Err(failure(envelope.error));
        }
        let rows = envelope.data.unwrap_or_default();
        let meta = match envelope.meta.pagination {
            Some(meta) => meta,
            None => {
                let total = envelope.meta.total.unwrap_or(0).max(rows.len() as u64);
                tracing::debug!(total, "response has no pagination, treating as one page");
                PaginationMeta::single_page(requested, total)
            }
        };
        return Ok(Page::new(rows, meta));
    }

    if value.get("items").is_some() {
        let envelope: CatalogEnvelope<T> = serde_json::from_value(value).map_err(decode_error)?;
        return Ok(Page::new(envelope.items, envelope.meta.into()));
    }

    Err(SourceError::Decode(
        "unrecognized response envelope".to_string(),
    ))
}

/// Decode a single record returned by a create or update.
pub fn decode_record<T: DeserializeOwned>(body: &[u8]) -> Result<T, SourceError> {
    let value = parse(body)?;

    if value.get("success").is_some() {
        let envelope: ApiEnvelope<T> = serde_json::from_value(value).map_err(decode_error)?;
        if !envelope.success {
            return Err(failure(envelope.error));
        }
        return envelope
            .data
            .ok_or_else(|| SourceError::Decode("response has no data".to_string()));
    }

    serde_json::from_value(value).map_err(decode_error)
}

/// Human-readable message from an error response body, if it has one.
pub fn error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value
        .pointer("/error/message")
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
