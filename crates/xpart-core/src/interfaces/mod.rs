// crates/xpart-core/src/interfaces/mod.rs
// ============================================================================
// Module: xpart Interfaces
// Description: Backend-agnostic interfaces for paged queries and bulk writes.
// Purpose: Define the contract surfaces the executor and loader depend on.
// Dependencies: crate::model, async-trait
// ============================================================================

//! ## Overview
//! Interfaces describe the document store as an opaque capability: run this
//! query against this collection scope and return one page plus its cost, or
//! upsert this batch of documents. Implementations own connection pooling,
//! wire protocol, partition routing, and retry policy.
//!
//! Security posture: page payloads come from the network and are untrusted;
//! implementations validate them into typed pages before returning.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::model::CollectionRef;
use crate::model::CountQuery;
use crate::model::FeedOptions;
use crate::model::PartitionKey;
use crate::model::QueryScope;

// ============================================================================
// SECTION: Query Feed
// ============================================================================

/// One round trip of a paged count query.
#[derive(Debug, Clone, Copy)]
pub struct FeedRequest<'a> {
    /// Target collection.
    pub collection: &'a CollectionRef,
    /// Logical query to execute.
    pub query: &'a CountQuery,
    /// Partition routing for the query.
    pub scope: &'a QueryScope,
    /// Paging and fan-out options.
    pub options: &'a FeedOptions,
    /// Continuation token from the previous page; `None` for the first page.
    pub continuation: Option<&'a str>,
}

/// Per-partition diagnostic metrics reported by the backend.
///
/// # Invariants
/// - Diagnostic only; never part of the aggregate result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QueryMetrics {
    /// Metric name mapped to its raw value.
    values: BTreeMap<String, String>,
}

impl QueryMetrics {
    /// Parses `name=value;name=value` metric text, skipping malformed pairs.
    #[must_use]
    pub fn parse_delimited(raw: &str) -> Self {
        let values = raw
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            .filter(|(name, _)| !name.is_empty())
            .collect();
        Self {
            values,
        }
    }

    /// Records one metric.
    pub fn insert(&mut self, name: impl Into<String>, value: impl fmt::Display) {
        self.values.insert(name.into(), value.to_string());
    }

    /// Returns a metric value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Returns true when no metrics were reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for QueryMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.values {
            if !first {
                f.write_str(";")?;
            }
            first = false;
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

/// One page of a count query feed.
///
/// # Invariants
/// - `items` are partial counts; their sum over all pages is the aggregate.
/// - `continuation` is `None` exactly when the feed is exhausted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedPage {
    /// Partial count values emitted by the backend aggregate pipeline.
    pub items: Vec<i64>,
    /// Cost units charged for this page.
    pub cost_units: f64,
    /// Diagnostic metrics keyed by partition identifier.
    pub partition_metrics: BTreeMap<String, QueryMetrics>,
    /// Token for the next page, if more results are pending.
    pub continuation: Option<String>,
}

impl FeedPage {
    /// Returns true when the backend reported more results pending.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.continuation.is_some()
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Document store failures.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Transport failure or backend unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Backend throttled the request and retries were exhausted.
    #[error("store throttled the request (retry after {retry_after_ms:?} ms)")]
    Throttled {
        /// Backend-suggested delay before retrying.
        retry_after_ms: Option<u64>,
    },
    /// Credentials were rejected.
    #[error("store rejected credentials: {0}")]
    Unauthorized(String),
    /// Target resource does not exist.
    #[error("store resource not found: {0}")]
    NotFound(String),
    /// Backend rejected the request.
    #[error("store rejected request with status {status}: {message}")]
    Rejected {
        /// HTTP-style status code.
        status: u16,
        /// Backend message.
        message: String,
    },
    /// Backend response could not be validated.
    #[error("store returned an invalid response: {0}")]
    InvalidResponse(String),
}

// ============================================================================
// SECTION: Document Store
// ============================================================================

/// Backend capable of executing paged count queries.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetches one page of results.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the page cannot be fetched or validated.
    async fn query_page(&self, request: FeedRequest<'_>) -> Result<FeedPage, StoreError>;
}

/// Shared, thread-safe document store handle.
pub type SharedDocumentStore = Arc<dyn DocumentStore>;

// ============================================================================
// SECTION: Bulk Writer
// ============================================================================

/// Document submitted for upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Unique document identifier.
    pub id: String,
    /// Partition the document routes to.
    pub partition_key: PartitionKey,
    /// Full JSON body, including `id`.
    pub body: Value,
}

/// Result of one bulk upsert call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchImportReport {
    /// Number of documents written.
    pub documents_imported: u64,
    /// Cost units consumed by the writes.
    pub cost_units: f64,
    /// Wall-clock time spent on the call.
    pub elapsed: Duration,
    /// Indices (into the submitted slice) of documents that were not written.
    pub failed: Vec<usize>,
}

/// Backend capable of batched upserts.
#[async_trait]
pub trait BulkWriter: Send + Sync {
    /// Verifies the target collection exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the collection is missing.
    async fn ensure_collection(&self, collection: &CollectionRef) -> Result<(), StoreError>;

    /// Upserts a batch of documents.
    ///
    /// Per-document failures are reported in [`BatchImportReport::failed`];
    /// an `Err` means the batch as a whole could not be attempted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the batch cannot be submitted.
    async fn upsert_batch(
        &self,
        collection: &CollectionRef,
        documents: &[Document],
    ) -> Result<BatchImportReport, StoreError>;
}
