// crates/xpart-core/src/model/query.rs
// ============================================================================
// Module: Count Query Model
// Description: Collection references, execution scopes, and count queries.
// Purpose: Build parameterized count queries and their partition scope.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! A [`CountQuery`] renders to `SELECT VALUE COUNT(1) FROM <collection> i`,
//! optionally followed by `WHERE i.<attribute> = @filterValue`. Attribute
//! paths come from configuration and are validated identifiers; filter values
//! come from requests and only ever travel as bound [`QueryParameter`]s.
//!
//! [`QueryScope`] tells the backend whether to route the query to one
//! partition or fan out across all of them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Name of the bound parameter carrying the filter value.
pub const FILTER_PARAMETER: &str = "@filterValue";
/// Alias bound to each document in rendered queries.
const DOCUMENT_ALIAS: &str = "i";
/// Source name used when the collection id is not a plain identifier.
const FALLBACK_SOURCE: &str = "root";
/// Default page size requested from the backend.
const DEFAULT_MAX_ITEM_COUNT: u32 = 50;
/// Default client-side buffer bound for cross-partition feeds.
const DEFAULT_MAX_BUFFERED_ITEM_COUNT: u32 = 100;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Query model validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Partition key was blank.
    #[error("partition key must not be empty")]
    EmptyPartitionKey,
    /// Attribute path is not a dotted identifier.
    #[error("invalid attribute path: {0}")]
    InvalidAttributePath(String),
    /// Database or collection identifier is unusable.
    #[error("invalid collection reference: {0}")]
    InvalidCollection(String),
}

// ============================================================================
// SECTION: Collection
// ============================================================================

/// Fixed database + collection pair targeted by every query.
///
/// # Invariants
/// - Both identifiers are non-empty and contain no `/`, `\`, `?` or `#`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionRef {
    /// Database identifier.
    database: String,
    /// Collection identifier.
    collection: String,
}

impl CollectionRef {
    /// Creates a validated collection reference.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidCollection`] when an identifier is blank
    /// or contains a reserved character.
    pub fn new(
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Result<Self, QueryError> {
        let database = database.into();
        let collection = collection.into();
        validate_resource_id("database", &database)?;
        validate_resource_id("collection", &collection)?;
        Ok(Self {
            database,
            collection,
        })
    }

    /// Returns the database identifier.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns the collection identifier.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the resource link `dbs/{database}/colls/{collection}`.
    #[must_use]
    pub fn resource_link(&self) -> String {
        format!("dbs/{}/colls/{}", self.database, self.collection)
    }

    /// Returns the name used after `FROM` in rendered queries.
    #[must_use]
    pub fn query_source(&self) -> &str {
        if is_identifier(&self.collection) { &self.collection } else { FALLBACK_SOURCE }
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.database, self.collection)
    }
}

// ============================================================================
// SECTION: Scope
// ============================================================================

/// Non-empty partition key value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Creates a partition key.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::EmptyPartitionKey`] when the value is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, QueryError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(QueryError::EmptyPartitionKey);
        }
        Ok(Self(value))
    }

    /// Returns the key value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Execution scope for a query.
///
/// # Invariants
/// - Exactly one variant is active; `SinglePartition` always carries a
///   non-empty key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryScope {
    /// Route to one partition; cross-partition fan-out disabled.
    SinglePartition(PartitionKey),
    /// Fan out across every partition.
    CrossPartition,
}

impl QueryScope {
    /// Selects the scope for an optional partition filter value.
    ///
    /// Present, non-blank values route to that partition; absent or blank
    /// values fan out.
    #[must_use]
    pub fn from_filter(filter: Option<&str>) -> Self {
        filter
            .and_then(|value| PartitionKey::new(value).ok())
            .map_or(Self::CrossPartition, Self::SinglePartition)
    }

    /// Returns true when the backend should fan out across partitions.
    #[must_use]
    pub const fn enables_cross_partition(&self) -> bool {
        matches!(self, Self::CrossPartition)
    }

    /// Returns the routed partition key, if any.
    #[must_use]
    pub const fn partition_key(&self) -> Option<&PartitionKey> {
        match self {
            Self::SinglePartition(key) => Some(key),
            Self::CrossPartition => None,
        }
    }

    /// Returns a stable label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::SinglePartition(_) => "single_partition",
            Self::CrossPartition => "cross_partition",
        }
    }
}

// ============================================================================
// SECTION: Query Model
// ============================================================================

/// Dotted document attribute path such as `customer` or `address.city`.
///
/// # Invariants
/// - Every segment matches `[A-Za-z_][A-Za-z0-9_]*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributePath(String);

impl AttributePath {
    /// Parses and validates an attribute path.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidAttributePath`] when a segment is not an
    /// identifier.
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.split('.').all(is_identifier) {
            return Err(QueryError::InvalidAttributePath(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the dotted path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Equality predicate on one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EqualityFilter {
    /// Attribute compared against the value.
    pub attribute: AttributePath,
    /// Untrusted filter value; bound, never rendered into query text.
    pub value: String,
}

/// Logical count query over a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountQuery {
    /// Name rendered after `FROM`.
    source: String,
    /// Optional equality filter.
    filter: Option<EqualityFilter>,
}

impl CountQuery {
    /// Counts every document in the collection.
    #[must_use]
    pub fn all(collection: &CollectionRef) -> Self {
        Self {
            source: collection.query_source().to_string(),
            filter: None,
        }
    }

    /// Counts documents whose attribute equals the value.
    #[must_use]
    pub fn filtered(
        collection: &CollectionRef,
        attribute: AttributePath,
        value: impl Into<String>,
    ) -> Self {
        Self {
            source: collection.query_source().to_string(),
            filter: Some(EqualityFilter {
                attribute,
                value: value.into(),
            }),
        }
    }

    /// Returns the filter, if any.
    #[must_use]
    pub const fn filter(&self) -> Option<&EqualityFilter> {
        self.filter.as_ref()
    }

    /// Renders the query text and its bound parameters.
    #[must_use]
    pub fn to_query_spec(&self) -> QuerySpec {
        let base = format!("SELECT VALUE COUNT(1) FROM {} {DOCUMENT_ALIAS}", self.source);
        match &self.filter {
            None => QuerySpec {
                query: base,
                parameters: Vec::new(),
            },
            Some(filter) => QuerySpec {
                query: format!(
                    "{base} WHERE {DOCUMENT_ALIAS}.{} = {FILTER_PARAMETER}",
                    filter.attribute
                ),
                parameters: vec![QueryParameter {
                    name: FILTER_PARAMETER.to_string(),
                    value: Value::String(filter.value.clone()),
                }],
            },
        }
    }
}

/// Rendered query text with bound parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Query text; contains parameter names, never parameter values.
    pub query: String,
    /// Bound parameters.
    #[serde(default)]
    pub parameters: Vec<QueryParameter>,
}

/// Named query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameter {
    /// Parameter name including the `@` prefix.
    pub name: String,
    /// Bound value.
    pub value: Value,
}

// ============================================================================
// SECTION: Feed Options
// ============================================================================

/// Paging and fan-out tuning passed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedOptions {
    /// Maximum items per page.
    #[serde(default = "default_max_item_count")]
    pub max_item_count: u32,
    /// Concurrent partitions per round trip; `None` lets the backend decide.
    #[serde(default)]
    pub max_degree_of_parallelism: Option<u32>,
    /// Upper bound on items buffered across partitions.
    #[serde(default = "default_max_buffered_item_count")]
    pub max_buffered_item_count: u32,
    /// Ask the backend for per-partition query metrics.
    #[serde(default = "default_populate_query_metrics")]
    pub populate_query_metrics: bool,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            max_item_count: DEFAULT_MAX_ITEM_COUNT,
            max_degree_of_parallelism: None,
            max_buffered_item_count: DEFAULT_MAX_BUFFERED_ITEM_COUNT,
            populate_query_metrics: true,
        }
    }
}

/// Returns the default page size.
const fn default_max_item_count() -> u32 {
    DEFAULT_MAX_ITEM_COUNT
}

/// Returns the default buffered item bound.
const fn default_max_buffered_item_count() -> u32 {
    DEFAULT_MAX_BUFFERED_ITEM_COUNT
}

/// Returns the default query metrics flag.
const fn default_populate_query_metrics() -> bool {
    true
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true for `[A-Za-z_][A-Za-z0-9_]*`.
fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    chars.next().is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Validates a database or collection identifier.
fn validate_resource_id(label: &str, value: &str) -> Result<(), QueryError> {
    if value.trim().is_empty() {
        return Err(QueryError::InvalidCollection(format!("{label} id must not be empty")));
    }
    if value.chars().any(|ch| matches!(ch, '/' | '\\' | '?' | '#') || ch.is_control()) {
        return Err(QueryError::InvalidCollection(format!(
            "{label} id contains a reserved character"
        )));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
