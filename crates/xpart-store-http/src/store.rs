// crates/xpart-store-http/src/store.rs
// ============================================================================
// Module: HTTP Document Store
// Description: REST client for paged count queries and bulk upserts.
// Purpose: Implement the core store interfaces against a remote account.
// Dependencies: xpart-core, reqwest, serde, tokio, tracing
// ============================================================================

//! ## Overview
//! [`HttpDocumentStore`] speaks the account's REST dialect: count queries are
//! `POST .../docs` with a `application/query+json` body and paging headers;
//! upserts are `POST .../docs` with the upsert header; collection checks are
//! `GET .../colls/{id}`. Every request is signed with the master key and
//! retried on throttling according to the [`RetryPolicy`].
//!
//! Security posture: response bodies are untrusted and are decoded into a
//! typed page shape before leaving this module. Error messages never carry
//! the account key.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::Method;
use reqwest::RequestBuilder;
use reqwest::Response;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use reqwest::redirect::Policy;
use serde::Deserialize;
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;
use tracing::warn;
use url::Url;
use xpart_core::BatchImportReport;
use xpart_core::BulkWriter;
use xpart_core::ClientFactory;
use xpart_core::CollectionRef;
use xpart_core::ConnectionDescriptor;
use xpart_core::Document;
use xpart_core::DocumentStore;
use xpart_core::FeedPage;
use xpart_core::FeedRequest;
use xpart_core::PartitionKey;
use xpart_core::QueryMetrics;
use xpart_core::QueryScope;
use xpart_core::SharedDocumentStore;
use xpart_core::StoreError;

use crate::auth::MasterKey;
use crate::auth::rfc1123_date;
use crate::retry::RetryPolicy;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// REST API version sent with every request.
const API_VERSION: &str = "2018-12-31";
/// Content type for query requests.
const QUERY_CONTENT_TYPE: &str = "application/query+json";
/// Request charge header.
const HEADER_REQUEST_CHARGE: &str = "x-ms-request-charge";
/// Continuation header (request and response).
const HEADER_CONTINUATION: &str = "x-ms-continuation";
/// Per-partition query metrics header.
const HEADER_QUERY_METRICS: &str = "x-ms-documentdb-query-metrics";
/// Partition key range that served the page.
const HEADER_PARTITION_RANGE: &str = "x-ms-documentdb-partitionkeyrangeid";
/// Suggested retry delay on throttling.
const HEADER_RETRY_AFTER_MS: &str = "x-ms-retry-after-ms";
/// Partition key header for routed requests.
const HEADER_PARTITION_KEY: &str = "x-ms-documentdb-partitionkey";
/// Partition key range id used when the service omits one.
const DEFAULT_PARTITION_RANGE: &str = "0";
/// Maximum error body bytes kept in error messages.
const MAX_ERROR_MESSAGE_BYTES: usize = 512;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Transport settings for [`HttpDocumentStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpStoreConfig {
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub request_timeout: Duration,
    /// Permit `http://` endpoints.
    pub allow_http: bool,
    /// Throttling retry budget.
    pub retry: RetryPolicy,
    /// Concurrent document writes per upsert batch.
    pub max_write_concurrency: usize,
}

impl Default for HttpStoreConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
            allow_http: false,
            retry: RetryPolicy::default(),
            max_write_concurrency: 16,
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Shared state behind every clone of [`HttpDocumentStore`].
struct StoreInner {
    /// Account endpoint with a trailing `/` path.
    endpoint: Url,
    /// Decoded signing key.
    key: MasterKey,
    /// HTTP client configured with timeouts.
    client: Client,
    /// Transport settings.
    config: HttpStoreConfig,
}

/// Remote document store over the account REST interface.
///
/// # Invariants
/// - The endpoint scheme is `https` unless `allow_http` was set.
/// - Clones share one connection pool.
#[derive(Clone)]
pub struct HttpDocumentStore {
    /// Shared client state.
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for HttpDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDocumentStore")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl HttpDocumentStore {
    /// Builds a store client for the account described by `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the endpoint scheme is not allowed, the
    /// key is not valid base64, or the HTTP client cannot be built.
    pub fn new(descriptor: &ConnectionDescriptor, config: HttpStoreConfig) -> Result<Self, StoreError> {
        let mut endpoint = descriptor.endpoint().clone();
        match endpoint.scheme() {
            "https" => {}
            "http" if config.allow_http => {}
            scheme => {
                return Err(StoreError::Unavailable(format!(
                    "endpoint scheme '{scheme}' is not allowed"
                )));
            }
        }
        if endpoint.cannot_be_a_base() || endpoint.host_str().is_none() {
            return Err(StoreError::Unavailable("endpoint must include a host".to_string()));
        }
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }
        endpoint.set_query(None);
        endpoint.set_fragment(None);
        let key = MasterKey::from_base64(descriptor.auth_key())?;
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .redirect(Policy::none())
            .build()
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(Self {
            inner: Arc::new(StoreInner {
                endpoint,
                key,
                client,
                config,
            }),
        })
    }

    /// Returns the normalized account endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Sends one signed request, retrying on throttling.
    async fn send(&self, call: &SignedCall<'_>) -> Result<Response, StoreError> {
        let url = self
            .inner
            .endpoint
            .join(&call.path)
            .map_err(|err| StoreError::Unavailable(format!("invalid request url: {err}")))?;
        let mut waited = Duration::ZERO;
        let mut retry = 0_u32;
        loop {
            let request = self.signed_request(call, url.clone())?;
            let response =
                request.send().await.map_err(|err| StoreError::Unavailable(err.to_string()))?;
            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }
            let suggested = header_u64(response.headers(), HEADER_RETRY_AFTER_MS);
            let Some(delay) = self.inner.config.retry.next_delay(
                retry,
                waited,
                suggested.map(Duration::from_millis),
            ) else {
                return Err(StoreError::Throttled {
                    retry_after_ms: suggested,
                });
            };
            warn!(
                resource = call.resource_link,
                retry = retry + 1,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "store throttled request; retrying"
            );
            tokio::time::sleep(delay).await;
            waited += delay;
            retry += 1;
        }
    }

    /// Builds a request with date, version, and authorization headers.
    fn signed_request(&self, call: &SignedCall<'_>, url: Url) -> Result<RequestBuilder, StoreError> {
        let date = rfc1123_date(OffsetDateTime::now_utc())?;
        let token = self.inner.key.authorization(
            call.method.as_str(),
            call.resource_type,
            call.resource_link,
            &date,
        )?;
        let mut headers = call.headers.clone();
        headers.insert("x-ms-date", header_value(&date)?);
        headers.insert("x-ms-version", HeaderValue::from_static(API_VERSION));
        headers.insert(reqwest::header::AUTHORIZATION, header_value(&token)?);
        let mut request = self.inner.client.request(call.method.clone(), url).headers(headers);
        if let Some(body) = &call.body {
            request = request.body(body.clone());
        }
        Ok(request)
    }

    /// Upserts one document, returning its request charge.
    async fn upsert_one(&self, collection: &CollectionRef, document: &Document) -> Result<f64, StoreError> {
        let resource_link = collection.resource_link();
        let body = serde_json::to_vec(&document.body)
            .map_err(|err| StoreError::Rejected {
                status: 400,
                message: format!("document serialization failed: {err}"),
            })?;
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-ms-documentdb-is-upsert", HeaderValue::from_static("True"));
        headers.insert(HEADER_PARTITION_KEY, partition_key_header(&document.partition_key)?);
        let call = SignedCall {
            method: Method::POST,
            path: format!("{resource_link}/docs"),
            resource_type: "docs",
            resource_link: &resource_link,
            headers,
            body: Some(body),
        };
        let response = check_status(self.send(&call).await?).await?;
        Ok(request_charge(response.headers())?.unwrap_or_default())
    }
}

/// One logical request; re-signed on every attempt.
struct SignedCall<'a> {
    /// HTTP method.
    method: Method,
    /// Path relative to the endpoint.
    path: String,
    /// Resource type segment used in the signature.
    resource_type: &'a str,
    /// Resource link used in the signature.
    resource_link: &'a str,
    /// Request-specific headers.
    headers: HeaderMap,
    /// Optional request body.
    body: Option<Vec<u8>>,
}

/// Query response body.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    /// Partial count values.
    #[serde(rename = "Documents")]
    documents: Vec<i64>,
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn query_page(&self, request: FeedRequest<'_>) -> Result<FeedPage, StoreError> {
        let resource_link = request.collection.resource_link();
        let body = serde_json::to_vec(&request.query.to_query_spec())
            .map_err(|err| StoreError::Rejected {
                status: 400,
                message: format!("query serialization failed: {err}"),
            })?;
        let headers = query_headers(&request)?;
        let call = SignedCall {
            method: Method::POST,
            path: format!("{resource_link}/docs"),
            resource_type: "docs",
            resource_link: &resource_link,
            headers,
            body: Some(body),
        };
        let response = check_status(self.send(&call).await?).await?;
        let cost_units = request_charge(response.headers())?.unwrap_or_default();
        let continuation = header_str(response.headers(), HEADER_CONTINUATION)
            .filter(|token| !token.is_empty())
            .map(str::to_string);
        let mut partition_metrics = BTreeMap::new();
        if let Some(raw) = header_str(response.headers(), HEADER_QUERY_METRICS) {
            let metrics = QueryMetrics::parse_delimited(raw);
            if !metrics.is_empty() {
                let range = header_str(response.headers(), HEADER_PARTITION_RANGE)
                    .unwrap_or(DEFAULT_PARTITION_RANGE);
                partition_metrics.insert(range.to_string(), metrics);
            }
        }
        let bytes = response.bytes().await.map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let body: QueryResponse = serde_json::from_slice(&bytes).map_err(|err| {
            StoreError::InvalidResponse(format!("query response is not a count page: {err}"))
        })?;
        debug!(
            resource = resource_link.as_str(),
            items = body.documents.len(),
            cost_units,
            has_more = continuation.is_some(),
            "store query page received"
        );
        Ok(FeedPage {
            items: body.documents,
            cost_units,
            partition_metrics,
            continuation,
        })
    }
}

#[async_trait]
impl BulkWriter for HttpDocumentStore {
    async fn ensure_collection(&self, collection: &CollectionRef) -> Result<(), StoreError> {
        let resource_link = collection.resource_link();
        let call = SignedCall {
            method: Method::GET,
            path: resource_link.clone(),
            resource_type: "colls",
            resource_link: &resource_link,
            headers: HeaderMap::new(),
            body: None,
        };
        check_status(self.send(&call).await?).await?;
        Ok(())
    }

    async fn upsert_batch(
        &self,
        collection: &CollectionRef,
        documents: &[Document],
    ) -> Result<BatchImportReport, StoreError> {
        let started = Instant::now();
        let permits = Arc::new(Semaphore::new(self.inner.config.max_write_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for (index, document) in documents.iter().enumerate() {
            let store = self.clone();
            let collection = collection.clone();
            let document = document.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (index, Err(StoreError::Unavailable("write limiter closed".to_string())));
                };
                (index, store.upsert_one(&collection, &document).await)
            });
        }

        let mut report = BatchImportReport::default();
        let mut fatal = None;
        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = joined
                .map_err(|err| StoreError::Unavailable(format!("upsert task failed: {err}")))?;
            match outcome {
                Ok(charge) => {
                    report.documents_imported += 1;
                    report.cost_units += charge;
                }
                Err(err @ (StoreError::Unauthorized(_) | StoreError::NotFound(_))) => {
                    fatal.get_or_insert(err);
                    report.failed.push(index);
                }
                Err(err) => {
                    debug!(index, error = %err, "document upsert failed");
                    report.failed.push(index);
                }
            }
        }
        if let Some(err) = fatal {
            return Err(err);
        }
        report.failed.sort_unstable();
        report.elapsed = started.elapsed();
        Ok(report)
    }
}

// ============================================================================
// SECTION: Factory
// ============================================================================

/// Builds [`HttpDocumentStore`] clients for the shared client.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpStoreFactory {
    /// Transport settings applied to every client.
    config: HttpStoreConfig,
}

impl HttpStoreFactory {
    /// Creates a factory.
    #[must_use]
    pub const fn new(config: HttpStoreConfig) -> Self {
        Self {
            config,
        }
    }

    /// Builds a concrete store for bulk writes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the client cannot be built.
    pub fn build(&self, descriptor: &ConnectionDescriptor) -> Result<HttpDocumentStore, StoreError> {
        HttpDocumentStore::new(descriptor, self.config)
    }
}

impl ClientFactory for HttpStoreFactory {
    fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<SharedDocumentStore, StoreError> {
        Ok(Arc::new(self.build(descriptor)?))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the paging and routing headers for a query page.
fn query_headers(request: &FeedRequest<'_>) -> Result<HeaderMap, StoreError> {
    let options = request.options;
    let mut headers = HeaderMap::new();
    headers.insert(reqwest::header::CONTENT_TYPE, HeaderValue::from_static(QUERY_CONTENT_TYPE));
    headers.insert("x-ms-documentdb-isquery", HeaderValue::from_static("True"));
    headers.insert("x-ms-max-item-count", HeaderValue::from(options.max_item_count));
    headers.insert(
        "x-ms-documentdb-query-enablecrosspartition",
        HeaderValue::from_static(if request.scope.enables_cross_partition() { "True" } else { "False" }),
    );
    if let QueryScope::SinglePartition(key) = request.scope {
        headers.insert(HEADER_PARTITION_KEY, partition_key_header(key)?);
    } else if options.max_degree_of_parallelism.is_none_or(|parallelism| parallelism > 1) {
        headers.insert(
            "x-ms-documentdb-query-parallelizecrosspartitionquery",
            HeaderValue::from_static("True"),
        );
    }
    headers.insert("x-ms-max-buffered-item-count", HeaderValue::from(options.max_buffered_item_count));
    if options.populate_query_metrics {
        headers.insert("x-ms-documentdb-query-populatemetrics", HeaderValue::from_static("True"));
    }
    if let Some(token) = request.continuation {
        headers.insert(HEADER_CONTINUATION, header_value(token)?);
    }
    Ok(headers)
}

/// Encodes a partition key as the single-element JSON array header.
fn partition_key_header(key: &PartitionKey) -> Result<HeaderValue, StoreError> {
    let encoded = serde_json::to_string(&[key.as_str()]).map_err(|err| StoreError::Rejected {
        status: 400,
        message: format!("partition key encoding failed: {err}"),
    })?;
    HeaderValue::from_str(&encoded).map_err(|_| StoreError::Rejected {
        status: 400,
        message: "partition key is not a valid header value".to_string(),
    })
}

/// Converts text into a header value.
fn header_value(value: &str) -> Result<HeaderValue, StoreError> {
    HeaderValue::from_str(value).map_err(|_| StoreError::Rejected {
        status: 400,
        message: "request header value is not valid".to_string(),
    })
}

/// Reads a UTF-8 header value.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}

/// Reads an unsigned integer header.
fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    header_str(headers, name)?.trim().parse().ok()
}

/// Reads the request charge header.
fn request_charge(headers: &HeaderMap) -> Result<Option<f64>, StoreError> {
    let Some(raw) = header_str(headers, HEADER_REQUEST_CHARGE) else {
        return Ok(None);
    };
    match raw.trim().parse::<f64>() {
        Ok(charge) if charge.is_finite() && charge >= 0.0 => Ok(Some(charge)),
        _ => Err(StoreError::InvalidResponse("request charge is not a non-negative number".to_string())),
    }
}

/// Maps non-success statuses onto store errors.
async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after_ms = header_u64(response.headers(), HEADER_RETRY_AFTER_MS);
    let message = response.text().await.map(|text| truncate(&text)).unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthorized(message),
        StatusCode::NOT_FOUND => StoreError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => StoreError::Throttled {
            retry_after_ms,
        },
        status => StoreError::Rejected {
            status: status.as_u16(),
            message,
        },
    })
}

/// Truncates an error body on a character boundary.
fn truncate(text: &str) -> String {
    if text.len() <= MAX_ERROR_MESSAGE_BYTES {
        return text.to_string();
    }
    let mut end = MAX_ERROR_MESSAGE_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[.. end].to_string()
}
