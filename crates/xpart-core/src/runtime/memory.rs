// crates/xpart-core/src/runtime/memory.rs
// ============================================================================
// Module: In-Memory Document Store
// Description: Partitioned, process-local document store backend.
// Purpose: Serve count feeds and bulk upserts without a remote account.
// Dependencies: crate::{model, interfaces}, async-trait, serde_json
// ============================================================================

//! ## Overview
//! Documents are grouped by collection, then partition key, then id. A count
//! query is evaluated partition by partition: each page carries one partial
//! count per visited partition, at most `min(max_item_count,
//! max_degree_of_parallelism)` partitions per page, and the continuation token
//! is the index of the next partition. Cost units are deterministic so tests
//! can assert exact totals.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use crate::interfaces::BatchImportReport;
use crate::interfaces::BulkWriter;
use crate::interfaces::Document;
use crate::interfaces::DocumentStore;
use crate::interfaces::FeedPage;
use crate::interfaces::FeedRequest;
use crate::interfaces::QueryMetrics;
use crate::interfaces::StoreError;
use crate::model::CollectionRef;
use crate::model::EqualityFilter;
use crate::model::PartitionKey;
use crate::model::QueryScope;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Fixed cost charged for every page.
const PAGE_BASE_COST: f64 = 2.0;
/// Additional cost per document scanned on a page.
const PAGE_COST_PER_DOCUMENT: f64 = 0.01;
/// Cost charged per upserted document.
const UPSERT_COST_PER_DOCUMENT: f64 = 5.0;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Documents of one partition keyed by id.
type PartitionData = BTreeMap<String, Value>;

/// Partitions of one collection.
type CollectionData = BTreeMap<PartitionKey, PartitionData>;

/// Process-local document store.
///
/// # Invariants
/// - Clones share the same underlying data.
/// - Queries against unregistered collections fail with `NotFound`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    /// Collections keyed by resource link.
    collections: Arc<RwLock<BTreeMap<String, CollectionData>>>,
}

impl InMemoryDocumentStore {
    /// Creates an empty store with no collections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the collection if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the store lock is poisoned.
    pub fn register_collection(&self, collection: &CollectionRef) -> Result<(), StoreError> {
        let mut guard = self.collections.write().map_err(|_| poisoned())?;
        guard.entry(collection.resource_link()).or_default();
        Ok(())
    }

    /// Inserts documents directly, replacing any with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the collection is unregistered.
    pub fn seed(&self, collection: &CollectionRef, documents: &[Document]) -> Result<(), StoreError> {
        let mut guard = self.collections.write().map_err(|_| poisoned())?;
        let data = guard
            .get_mut(&collection.resource_link())
            .ok_or_else(|| StoreError::NotFound(collection.resource_link()))?;
        for document in documents {
            insert_document(data, document);
        }
        Ok(())
    }

    /// Returns the number of documents stored in the collection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the collection is unregistered.
    pub fn document_count(&self, collection: &CollectionRef) -> Result<usize, StoreError> {
        let guard = self.collections.read().map_err(|_| poisoned())?;
        let data = guard
            .get(&collection.resource_link())
            .ok_or_else(|| StoreError::NotFound(collection.resource_link()))?;
        Ok(data.values().map(BTreeMap::len).sum())
    }

    /// Returns the number of non-empty partitions in the collection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the collection is unregistered.
    pub fn partition_count(&self, collection: &CollectionRef) -> Result<usize, StoreError> {
        let guard = self.collections.read().map_err(|_| poisoned())?;
        let data = guard
            .get(&collection.resource_link())
            .ok_or_else(|| StoreError::NotFound(collection.resource_link()))?;
        Ok(data.values().filter(|partition| !partition.is_empty()).count())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn query_page(&self, request: FeedRequest<'_>) -> Result<FeedPage, StoreError> {
        let guard = self.collections.read().map_err(|_| poisoned())?;
        let data = guard
            .get(&request.collection.resource_link())
            .ok_or_else(|| StoreError::NotFound(request.collection.resource_link()))?;

        let partitions: Vec<(&PartitionKey, &PartitionData)> = match request.scope {
            QueryScope::SinglePartition(key) => data.get_key_value(key).into_iter().collect(),
            QueryScope::CrossPartition => data.iter().collect(),
        };
        let start = parse_continuation(request.continuation, partitions.len())?;
        let parallelism = request.options.max_degree_of_parallelism.unwrap_or(u32::MAX);
        let per_page = request.options.max_item_count.min(parallelism).max(1);
        let per_page = usize::try_from(per_page).unwrap_or(usize::MAX);
        let end = start.saturating_add(per_page).min(partitions.len());

        let filter = request.query.filter();
        let mut page = FeedPage::default();
        let mut scanned = 0_usize;
        for (key, partition) in partitions.get(start .. end).unwrap_or_default() {
            let matched = partition.values().filter(|body| matches_filter(body, filter)).count();
            scanned += partition.len();
            let partial = i64::try_from(matched).map_err(|_| {
                StoreError::InvalidResponse("partition count exceeds i64".to_string())
            })?;
            page.items.push(partial);
            if request.options.populate_query_metrics {
                let mut metrics = QueryMetrics::default();
                metrics.insert("retrievedDocumentCount", partition.len());
                metrics.insert("outputDocumentCount", matched);
                page.partition_metrics.insert(key.as_str().to_string(), metrics);
            }
        }
        #[allow(clippy::cast_precision_loss, reason = "Scanned counts stay far below 2^52.")]
        let scanned_cost = scanned as f64 * PAGE_COST_PER_DOCUMENT;
        page.cost_units = PAGE_BASE_COST + scanned_cost;
        page.continuation = (end < partitions.len()).then(|| end.to_string());
        Ok(page)
    }
}

#[async_trait]
impl BulkWriter for InMemoryDocumentStore {
    async fn ensure_collection(&self, collection: &CollectionRef) -> Result<(), StoreError> {
        let guard = self.collections.read().map_err(|_| poisoned())?;
        if guard.contains_key(&collection.resource_link()) {
            Ok(())
        } else {
            Err(StoreError::NotFound(collection.resource_link()))
        }
    }

    async fn upsert_batch(
        &self,
        collection: &CollectionRef,
        documents: &[Document],
    ) -> Result<BatchImportReport, StoreError> {
        let started = Instant::now();
        self.seed(collection, documents)?;
        let imported = u64::try_from(documents.len()).unwrap_or(u64::MAX);
        #[allow(clippy::cast_precision_loss, reason = "Batch sizes stay far below 2^52.")]
        let cost_units = imported as f64 * UPSERT_COST_PER_DOCUMENT;
        Ok(BatchImportReport {
            documents_imported: imported,
            cost_units,
            elapsed: started.elapsed(),
            failed: Vec::new(),
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps lock poisoning to a store error.
fn poisoned() -> StoreError {
    StoreError::Unavailable("in-memory store lock poisoned".to_string())
}

/// Places a document in its partition, replacing by id.
fn insert_document(data: &mut CollectionData, document: &Document) {
    data.entry(document.partition_key.clone())
        .or_default()
        .insert(document.id.clone(), document.body.clone());
}

/// Parses a partition-index continuation token.
fn parse_continuation(token: Option<&str>, partitions: usize) -> Result<usize, StoreError> {
    let Some(token) = token else {
        return Ok(0);
    };
    match token.parse::<usize>() {
        Ok(index) if index <= partitions => Ok(index),
        _ => Err(StoreError::Rejected {
            status: 400,
            message: "invalid continuation token".to_string(),
        }),
    }
}

/// Returns true when the document satisfies the optional equality filter.
fn matches_filter(body: &Value, filter: Option<&EqualityFilter>) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    let mut current = body;
    for segment in filter.attribute.segments() {
        match current.get(segment) {
            Some(next) => current = next,
            None => return false,
        }
    }
    match current {
        Value::String(text) => *text == filter.value,
        Value::Number(number) => number.to_string() == filter.value,
        Value::Bool(flag) => flag.to_string() == filter.value,
        Value::Null | Value::Array(_) | Value::Object(_) => false,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use serde_json::json;

    use super::matches_filter;
    use super::parse_continuation;
    use crate::model::AttributePath;
    use crate::model::EqualityFilter;

    fn filter(path: &str, value: &str) -> EqualityFilter {
        EqualityFilter {
            attribute: AttributePath::parse(path).unwrap(),
            value: value.to_string(),
        }
    }

    #[test]
    fn numeric_attributes_match_their_decimal_text() {
        let body = json!({"customer": 417, "address": {"city": "Oslo"}});
        assert!(matches_filter(&body, Some(&filter("customer", "417"))));
        assert!(!matches_filter(&body, Some(&filter("customer", "0417"))));
        assert!(matches_filter(&body, Some(&filter("address.city", "Oslo"))));
        assert!(!matches_filter(&body, Some(&filter("address.zip", "Oslo"))));
        assert!(matches_filter(&body, None));
    }

    #[test]
    fn continuation_tokens_must_be_in_range() {
        assert_eq!(parse_continuation(None, 3).unwrap(), 0);
        assert_eq!(parse_continuation(Some("2"), 3).unwrap(), 2);
        assert!(parse_continuation(Some("4"), 3).is_err());
        assert!(parse_continuation(Some("abc"), 3).is_err());
    }
}
