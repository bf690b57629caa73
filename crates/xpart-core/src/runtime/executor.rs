// crates/xpart-core/src/runtime/executor.rs
// ============================================================================
// Module: Aggregate Executor
// Description: Scope selection and paged count accumulation per dimension.
// Purpose: Turn an optional filter value into `{count, total cost}`.
// Dependencies: crate::{model, interfaces, runtime}, tokio, tokio-util, tracing
// ============================================================================

//! ## Overview
//! One [`AggregateExecutor`] serves one aggregate dimension (for example
//! items by customer). For each request it picks the execution scope, builds
//! the parameterized count query, drains the feed, and sums every partial
//! count and every page's cost units.
//!
//! Accumulation is all-or-nothing: a failed page or a cancellation discards
//! everything gathered so far.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

use crate::interfaces::StoreError;
use crate::model::AttributePath;
use crate::model::CollectionRef;
use crate::model::ConnectionErrorKind;
use crate::model::ConnectionStringError;
use crate::model::CountQuery;
use crate::model::FeedOptions;
use crate::model::QueryScope;
use crate::runtime::client::SharedClient;
use crate::runtime::feed::DocumentQuery;

// ============================================================================
// SECTION: Results
// ============================================================================

/// Final aggregate for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregateResult {
    /// Sum of every partial count across every page.
    pub count: i64,
    /// Sum of every page's cost units.
    pub total_cost_units: f64,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Aggregate request failures.
///
/// # Invariants
/// - `Configuration` and `Format` indicate deployment problems and are not
///   retried.
/// - `Cancelled` is a caller decision, not a failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregateError {
    /// Connection string missing, unusable, or client construction failed.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Connection string syntax was malformed.
    #[error("connection string format error: {0}")]
    Format(ConnectionStringError),
    /// Backend failed while fetching a page.
    #[error("execution error: {0}")]
    Execution(#[from] StoreError),
    /// Caller cancelled the request before the feed was drained.
    #[error("aggregate request cancelled")]
    Cancelled,
}

impl From<ConnectionStringError> for AggregateError {
    fn from(err: ConnectionStringError) -> Self {
        match err.kind() {
            ConnectionErrorKind::Configuration => Self::Configuration(err.to_string()),
            ConnectionErrorKind::Format => Self::Format(err),
        }
    }
}

// ============================================================================
// SECTION: Dimension
// ============================================================================

/// Attribute an aggregate filters on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateDimension {
    /// Aggregate name, used as the route segment and in logs.
    name: String,
    /// Document attribute compared against the filter value.
    attribute: AttributePath,
    /// True when `attribute` is the collection's partition key.
    partition_key: bool,
}

impl AggregateDimension {
    /// Creates a dimension.
    #[must_use]
    pub fn new(name: impl Into<String>, attribute: AttributePath, partition_key: bool) -> Self {
        Self {
            name: name.into(),
            attribute,
            partition_key,
        }
    }

    /// Returns the aggregate name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the filtered attribute.
    #[must_use]
    pub const fn attribute(&self) -> &AttributePath {
        &self.attribute
    }

    /// Returns true when filter values are partition keys.
    #[must_use]
    pub const fn is_partition_key(&self) -> bool {
        self.partition_key
    }

    /// Selects the execution scope for a filter value.
    ///
    /// Only partition-key dimensions can route to one partition; any other
    /// attribute must fan out even when filtered.
    #[must_use]
    pub fn select_scope(&self, filter: Option<&str>) -> QueryScope {
        if self.partition_key {
            QueryScope::from_filter(filter)
        } else {
            QueryScope::CrossPartition
        }
    }

    /// Builds the count query for a filter value.
    #[must_use]
    pub fn build_query(&self, collection: &CollectionRef, filter: Option<&str>) -> CountQuery {
        match non_blank(filter) {
            Some(value) => CountQuery::filtered(collection, self.attribute.clone(), value),
            None => CountQuery::all(collection),
        }
    }
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Paged count executor for one dimension over a fixed collection.
#[derive(Debug, Clone)]
pub struct AggregateExecutor {
    /// Lazily constructed backend handle shared across executors.
    client: Arc<SharedClient>,
    /// Fixed target collection.
    collection: CollectionRef,
    /// Filtered attribute.
    dimension: AggregateDimension,
    /// Paging options passed to every page request.
    options: FeedOptions,
}

impl AggregateExecutor {
    /// Creates an executor.
    #[must_use]
    pub const fn new(
        client: Arc<SharedClient>,
        collection: CollectionRef,
        dimension: AggregateDimension,
        options: FeedOptions,
    ) -> Self {
        Self {
            client,
            collection,
            dimension,
            options,
        }
    }

    /// Returns the dimension served by this executor.
    #[must_use]
    pub const fn dimension(&self) -> &AggregateDimension {
        &self.dimension
    }

    /// Returns the target collection.
    #[must_use]
    pub const fn collection(&self) -> &CollectionRef {
        &self.collection
    }

    /// Counts documents matching the optional filter value.
    ///
    /// Blank filter values are treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::Configuration`] or [`AggregateError::Format`]
    /// when the shared client cannot be built, [`AggregateError::Execution`]
    /// when any page fails, and [`AggregateError::Cancelled`] when `cancel`
    /// fires before the feed is drained.
    pub async fn count(
        &self,
        filter: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<AggregateResult, AggregateError> {
        if cancel.is_cancelled() {
            return Err(AggregateError::Cancelled);
        }
        let store = self.client.get()?;
        let filter = non_blank(filter);
        let scope = self.dimension.select_scope(filter);
        let query = self.dimension.build_query(&self.collection, filter);
        let mut feed =
            DocumentQuery::new(&*store, &self.collection, &query, &scope, &self.options);

        let mut result = AggregateResult::default();
        loop {
            let page = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(AggregateError::Cancelled),
                page = feed.next_page() => page?,
            };
            let Some(page) = page else {
                break;
            };
            for item in &page.items {
                result.count = result.count.checked_add(*item).ok_or_else(|| {
                    StoreError::InvalidResponse("partial counts overflow i64".to_string())
                })?;
            }
            result.total_cost_units += page.cost_units;
            debug!(
                aggregate = self.dimension.name(),
                page = feed.pages_fetched(),
                items = page.items.len(),
                cost_units = page.cost_units,
                has_more = page.has_more(),
                "aggregate page fetched"
            );
            for (partition, metrics) in &page.partition_metrics {
                debug!(
                    aggregate = self.dimension.name(),
                    partition = partition.as_str(),
                    metrics = %metrics,
                    "partition query metrics"
                );
            }
        }

        info!(
            aggregate = self.dimension.name(),
            scope = scope.label(),
            pages = feed.pages_fetched(),
            count = result.count,
            total_cost_units = result.total_cost_units,
            "aggregate completed"
        );
        Ok(result)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Drops blank filter values.
fn non_blank(filter: Option<&str>) -> Option<&str> {
    filter.filter(|value| !value.trim().is_empty())
}
