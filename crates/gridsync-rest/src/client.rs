//! REST data source.

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::time::Duration;
use url::Url;

use gridsync_core::{ApiConfig, Page, PageUnit, QueryState, SourceError};
use gridsync_engine::DataSource;

use crate::envelope::{decode_page, decode_record, error_message};
use crate::params::query_params;

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise a backend base URL:
/// - ensure a scheme is present (http for localhost, https otherwise)
/// - strip trailing slashes
/// - end with exactly one slash so resource paths join below it
pub fn normalize_base_url(raw: &str) -> Result<Url, SourceError> {
    let mut url = raw.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    url.push('/');

    Url::parse(&url).map_err(|e| SourceError::Http(format!("Invalid backend URL {raw}: {e}")))
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a `SourceError`.
fn transport_error(url: &Url, timeout: Duration, err: &reqwest::Error) -> SourceError {
    if err.is_timeout() {
        return SourceError::Timeout { duration: timeout };
    }
    if err.is_connect() {
        return SourceError::Http(format!("Cannot reach backend at {url}"));
    }
    if err.is_builder() {
        return SourceError::Http(format!("Invalid request URL: {url}"));
    }
    if err.is_decode() || err.is_body() {
        return SourceError::Decode(err.to_string());
    }
    SourceError::Http(format!("Network error communicating with {url}: {err}"))
}

/// Fallback message for a status whose body says nothing useful.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "API key is invalid or expired".to_string(),
        403 => "Not authorized for this resource".to_string(),
        404 => "Endpoint not found".to_string(),
        s if s >= 500 => format!("Backend server error (HTTP {s})"),
        s => format!("Unexpected response from backend (HTTP {s})"),
    }
}

// ---------------------------------------------------------------------------
// RestSource
// ---------------------------------------------------------------------------

/// Data source for one REST resource, e.g. `api/v1/items`.
///
/// Rows are decoded into `T`. Also performs the resource's create, update
/// and delete calls.
pub struct RestSource<T> {
    client: Client,
    endpoint: Url,
    page_unit: PageUnit,
    timeout: Duration,
    api_key: Option<String>,
    _rows: PhantomData<fn() -> T>,
}

impl<T> RestSource<T> {
    pub fn new(api: &ApiConfig, resource: &str) -> Result<Self, SourceError> {
        let base = normalize_base_url(&api.base_url)?;
        let endpoint = base
            .join(resource.trim_matches('/'))
            .map_err(|e| SourceError::Http(format!("Invalid resource path {resource}: {e}")))?;

        let client = Client::builder()
            .timeout(api.timeout())
            .build()
            .map_err(|e| SourceError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            page_unit: api.page_unit,
            timeout: api.timeout(),
            api_key: api.api_key.clone().filter(|k| !k.is_empty()),
            _rows: PhantomData,
        })
    }

    /// Collection URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn page_unit(&self) -> PageUnit {
        self.page_unit
    }

    fn record_url(&self, id: &str) -> Result<Url, SourceError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::Http(format!("Cannot address records under {}", self.endpoint)))?
            .push(id);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self
            .client
            .request(method, url)
            .header("Accept", "application/json");
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Send a request and return the body of a successful response.
    async fn send(request: RequestBuilder, url: Url, timeout: Duration) -> Result<Vec<u8>, SourceError> {
        let response: Response = request
            .send()
            .await
            .map_err(|e| transport_error(&url, timeout, &e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(&url, timeout, &e))?;

        if !status.is_success() {
            let message = error_message(&body).unwrap_or_else(|| status_error(status));
            tracing::warn!(%url, status = status.as_u16(), %message, "request failed");
            return Err(SourceError::Status {
                code: status.as_u16(),
                message,
            });
        }

        Ok(body.to_vec())
    }
}

impl<T: DeserializeOwned> RestSource<T> {
    /// Create a record and return it as the server stored it.
    pub async fn create<B: Serialize + ?Sized>(&self, body: &B) -> Result<T, SourceError> {
        let url = self.endpoint.clone();
        tracing::debug!(%url, "creating record");
        let request = self.request(Method::POST, url.clone()).json(body);
        let bytes = Self::send(request, url, self.timeout).await?;
        decode_record(&bytes)
    }

    /// Replace a record's fields and return the updated record.
    pub async fn update<B: Serialize + ?Sized>(&self, id: &str, body: &B) -> Result<T, SourceError> {
        let url = self.record_url(id)?;
        tracing::debug!(%url, "updating record");
        let request = self.request(Method::PUT, url.clone()).json(body);
        let bytes = Self::send(request, url, self.timeout).await?;
        decode_record(&bytes)
    }

    /// Delete a record.
    pub async fn delete(&self, id: &str) -> Result<(), SourceError> {
        let url = self.record_url(id)?;
        tracing::debug!(%url, "deleting record");
        let request = self.request(Method::DELETE, url.clone());
        Self::send(request, url, self.timeout).await?;
        Ok(())
    }
}

impl<T> DataSource<T> for RestSource<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn fetch_page(&self, query: QueryState) -> BoxFuture<'static, Result<Page<T>, SourceError>> {
        let params = query_params(&query, self.page_unit);
        let url = self.endpoint.clone();
        let request = self.request(Method::GET, url.clone()).query(&params);
        let timeout = self.timeout;
        let requested = query.pagination;

        Box::pin(async move {
            tracing::debug!(%url, ?params, "fetching page");
            let body = Self::send(request, url, timeout).await?;
            decode_page(&body, requested)
        })
    }
}
