// crates/xpart-config/src/config.rs
// ============================================================================
// Module: xpart Configuration
// Description: Configuration loading and validation for xpart services.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: xpart-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! The path comes from the caller, then `XPART_CONFIG`, then `xpart.toml`;
//! when none was named and the default file is absent, built-in defaults
//! apply. Every section is validated before use.
//!
//! Security posture: connection strings are secrets. They are resolved into a
//! [`ConnectionSource`] whose `Debug` output hides the value.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use xpart_core::AggregateDimension;
use xpart_core::AttributePath;
use xpart_core::CollectionRef;
use xpart_core::ConnectionSource;
use xpart_core::FeedOptions;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "xpart.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "XPART_CONFIG";
/// Default environment variable carrying the connection string.
pub const DEFAULT_CONNECTION_STRING_ENV: &str = "XPART_CONNECTION_STRING";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of configured aggregates.
const MAX_AGGREGATES: usize = 64;
/// Maximum page size accepted by the backend.
const MAX_ITEM_COUNT: u32 = 1_000;
/// Minimum store connect timeout in milliseconds.
const MIN_CONNECT_TIMEOUT_MS: u64 = 100;
/// Maximum store connect timeout in milliseconds.
const MAX_CONNECT_TIMEOUT_MS: u64 = 60_000;
/// Minimum store request timeout in milliseconds.
const MIN_REQUEST_TIMEOUT_MS: u64 = 500;
/// Maximum store request timeout in milliseconds.
const MAX_REQUEST_TIMEOUT_MS: u64 = 300_000;
/// Maximum cumulative throttling wait in milliseconds.
const MAX_RETRY_WAIT_MS: u64 = 300_000;
/// Maximum throttling retry attempts.
const MAX_THROTTLE_ATTEMPTS: u32 = 100;
/// Maximum documents per loader batch.
const MAX_DOCUMENTS_PER_BATCH: u32 = 100_000;
/// Maximum concurrent loader writes.
const MAX_LOADER_CONCURRENCY: u32 = 256;
/// Maximum resubmissions of one loader batch.
const MAX_BATCH_ATTEMPTS: u32 = 100;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Complete xpart configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct XpartConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Document store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Paging options for aggregate queries.
    #[serde(default)]
    pub feed: FeedOptions,
    /// Aggregates exposed by the server.
    #[serde(default = "default_aggregates")]
    pub aggregates: Vec<AggregateConfig>,
    /// Bulk loader settings.
    #[serde(default)]
    pub loader: LoaderConfig,
}

impl Default for XpartConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            feed: FeedOptions::default(),
            aggregates: default_aggregates(),
            loader: LoaderConfig::default(),
        }
    }
}

impl XpartConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |name| env::var(name).ok())
    }

    /// Loads configuration, reading environment variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load_with(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let (resolved, explicit) = resolve_path(path, &lookup)?;
        validate_path(&resolved)?;
        if !explicit && !resolved.exists() {
            let mut config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.store.validate()?;
        validate_feed(&self.feed)?;
        self.loader.validate()?;
        if self.aggregates.is_empty() {
            return Err(ConfigError::Invalid("aggregates must not be empty".to_string()));
        }
        if self.aggregates.len() > MAX_AGGREGATES {
            return Err(ConfigError::Invalid("too many aggregates configured".to_string()));
        }
        let mut names = BTreeSet::new();
        for aggregate in &self.aggregates {
            aggregate.validate()?;
            if !names.insert(aggregate.name.to_ascii_lowercase()) {
                return Err(ConfigError::Invalid(format!(
                    "aggregates.name '{}' is duplicated",
                    aggregate.name
                )));
            }
        }
        Ok(())
    }

    /// Builds the executor dimensions for every configured aggregate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an attribute path is invalid.
    pub fn dimensions(&self) -> Result<Vec<AggregateDimension>, ConfigError> {
        let partition_key = self.store.partition_key_path()?;
        self.aggregates.iter().map(|aggregate| aggregate.dimension(&partition_key)).collect()
    }
}

// ============================================================================
// SECTION: Server Config
// ============================================================================

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Path prefix for aggregate routes; empty or `/segment` form.
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            route_prefix: default_route_prefix(),
        }
    }
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid("server.bind must be a socket address".to_string()))
    }

    /// Validates server settings.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        let prefix = self.route_prefix.as_str();
        if prefix.is_empty() {
            return Ok(());
        }
        if !prefix.starts_with('/') || prefix.ends_with('/') {
            return Err(ConfigError::Invalid(
                "server.route_prefix must start with '/' and must not end with '/'".to_string(),
            ));
        }
        if prefix[1 ..].split('/').any(|segment| !is_route_segment(segment)) {
            return Err(ConfigError::Invalid(
                "server.route_prefix segments must be alphanumeric, '-' or '_'".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Store Config
// ============================================================================

/// Document store backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Remote account over HTTPS.
    #[default]
    Http,
    /// Process-local store.
    Memory,
}

/// Document store settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Backend selection.
    #[serde(default)]
    pub kind: StoreKind,
    /// Database identifier.
    #[serde(default = "default_database")]
    pub database: String,
    /// Collection identifier.
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Attribute the collection is partitioned on.
    #[serde(default = "default_partition_key")]
    pub partition_key: String,
    /// Environment variable holding the connection string.
    #[serde(default = "default_connection_string_env")]
    pub connection_string_env: String,
    /// Inline connection string; takes precedence over the environment.
    #[serde(default)]
    pub connection_string: Option<String>,
    /// TCP connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Permit `http://` endpoints.
    #[serde(default)]
    pub allow_http: bool,
    /// Throttling retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            database: default_database(),
            collection: default_collection(),
            partition_key: default_partition_key(),
            connection_string_env: default_connection_string_env(),
            connection_string: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            allow_http: false,
            retry: RetryConfig::default(),
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("kind", &self.kind)
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("partition_key", &self.partition_key)
            .field("connection_string_env", &self.connection_string_env)
            .field("connection_string", &self.connection_string.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("allow_http", &self.allow_http)
            .field("retry", &self.retry)
            .finish()
    }
}

impl StoreConfig {
    /// Returns the validated collection reference.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when an identifier is unusable.
    pub fn collection_ref(&self) -> Result<CollectionRef, ConfigError> {
        CollectionRef::new(self.database.trim(), self.collection.trim())
            .map_err(|err| ConfigError::Invalid(format!("store: {err}")))
    }

    /// Returns the partition key attribute path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the path is not a dotted identifier.
    pub fn partition_key_path(&self) -> Result<AttributePath, ConfigError> {
        AttributePath::parse(&self.partition_key)
            .map_err(|err| ConfigError::Invalid(format!("store.partition_key: {err}")))
    }

    /// Resolves the connection string from config or the process environment.
    #[must_use]
    pub fn connection_source(&self) -> ConnectionSource {
        self.connection_source_with(|name| env::var(name).ok())
    }

    /// Resolves the connection string, reading the environment via `lookup`.
    ///
    /// An inline value wins over the environment variable.
    #[must_use]
    pub fn connection_source_with(&self, lookup: impl Fn(&str) -> Option<String>) -> ConnectionSource {
        if let Some(inline) = &self.connection_string {
            return ConnectionSource::new("store.connection_string", Some(inline.clone()));
        }
        ConnectionSource::new(
            self.connection_string_env.clone(),
            lookup(&self.connection_string_env),
        )
    }

    /// Validates store settings.
    fn validate(&self) -> Result<(), ConfigError> {
        self.collection_ref()?;
        self.partition_key_path()?;
        if !is_env_var_name(&self.connection_string_env) {
            return Err(ConfigError::Invalid(
                "store.connection_string_env must be a valid environment variable name"
                    .to_string(),
            ));
        }
        if !(MIN_CONNECT_TIMEOUT_MS ..= MAX_CONNECT_TIMEOUT_MS).contains(&self.connect_timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "store.connect_timeout_ms must be between {MIN_CONNECT_TIMEOUT_MS} and \
                 {MAX_CONNECT_TIMEOUT_MS}"
            )));
        }
        if !(MIN_REQUEST_TIMEOUT_MS ..= MAX_REQUEST_TIMEOUT_MS).contains(&self.request_timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "store.request_timeout_ms must be between {MIN_REQUEST_TIMEOUT_MS} and \
                 {MAX_REQUEST_TIMEOUT_MS}"
            )));
        }
        self.retry.validate()
    }
}

/// Throttling retry policy for the HTTP store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Maximum retries of one request after a throttling response.
    #[serde(default = "default_max_attempts_on_throttled")]
    pub max_attempts_on_throttled: u32,
    /// Maximum cumulative wait across retries in milliseconds.
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts_on_throttled: default_max_attempts_on_throttled(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

impl RetryConfig {
    /// Validates retry settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts_on_throttled > MAX_THROTTLE_ATTEMPTS {
            return Err(ConfigError::Invalid(format!(
                "store.retry.max_attempts_on_throttled must be at most {MAX_THROTTLE_ATTEMPTS}"
            )));
        }
        if self.max_wait_ms > MAX_RETRY_WAIT_MS {
            return Err(ConfigError::Invalid(format!(
                "store.retry.max_wait_ms must be at most {MAX_RETRY_WAIT_MS}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Aggregate Config
// ============================================================================

/// One aggregate route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregateConfig {
    /// Route segment and log name, e.g. `ItemCountByCustomer`.
    pub name: String,
    /// Query string parameter carrying the filter value.
    pub query_param: String,
    /// Document attribute compared against the filter value.
    pub attribute: String,
}

impl AggregateConfig {
    /// Builds the executor dimension; partition-scoped when the attribute is
    /// the store's partition key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the attribute path is invalid.
    pub fn dimension(&self, partition_key: &AttributePath) -> Result<AggregateDimension, ConfigError> {
        let attribute = AttributePath::parse(&self.attribute).map_err(|err| {
            ConfigError::Invalid(format!("aggregates '{}' attribute: {err}", self.name))
        })?;
        let partitioned = attribute == *partition_key;
        Ok(AggregateDimension::new(self.name.clone(), attribute, partitioned))
    }

    /// Validates one aggregate.
    fn validate(&self) -> Result<(), ConfigError> {
        if !is_route_segment(&self.name) {
            return Err(ConfigError::Invalid(format!(
                "aggregates.name '{}' must be alphanumeric, '-' or '_'",
                self.name
            )));
        }
        if !is_route_segment(&self.query_param) {
            return Err(ConfigError::Invalid(format!(
                "aggregates '{}' query_param must be alphanumeric, '-' or '_'",
                self.name
            )));
        }
        AttributePath::parse(&self.attribute).map_err(|err| {
            ConfigError::Invalid(format!("aggregates '{}' attribute: {err}", self.name))
        })?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Loader Config
// ============================================================================

/// Bulk loader settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
    /// Number of batches to write.
    #[serde(default = "default_batch_count")]
    pub batch_count: u32,
    /// Documents generated per batch.
    #[serde(default = "default_documents_per_batch")]
    pub documents_per_batch: u32,
    /// Concurrent writes within a batch.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
    /// Submissions of one batch before giving up on its remaining documents.
    #[serde(default = "default_max_batch_attempts")]
    pub max_batch_attempts: u32,
    /// Distinct customer values drawn by the generator.
    #[serde(default = "default_cardinality")]
    pub customer_cardinality: u32,
    /// Distinct product codes drawn by the generator.
    #[serde(default = "default_cardinality")]
    pub product_cardinality: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_count: default_batch_count(),
            documents_per_batch: default_documents_per_batch(),
            max_concurrency: default_max_concurrency(),
            max_batch_attempts: default_max_batch_attempts(),
            customer_cardinality: default_cardinality(),
            product_cardinality: default_cardinality(),
        }
    }
}

impl LoaderConfig {
    /// Validates loader settings.
    fn validate(&self) -> Result<(), ConfigError> {
        check_range("loader.batch_count", self.batch_count, 1, u32::MAX)?;
        check_range("loader.documents_per_batch", self.documents_per_batch, 1, MAX_DOCUMENTS_PER_BATCH)?;
        check_range("loader.max_concurrency", self.max_concurrency, 1, MAX_LOADER_CONCURRENCY)?;
        check_range("loader.max_batch_attempts", self.max_batch_attempts, 1, MAX_BATCH_ATTEMPTS)?;
        check_range("loader.customer_cardinality", self.customer_cardinality, 1, u32::MAX)?;
        check_range("loader.product_cardinality", self.product_cardinality, 1, u32::MAX)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the caller or environment defaults.
///
/// Returns the path and whether it was named explicitly.
fn resolve_path(
    path: Option<&Path>,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<(PathBuf, bool), ConfigError> {
    if let Some(path) = path {
        return Ok((path.to_path_buf(), true));
    }
    if let Some(env_path) = lookup(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok((PathBuf::from(env_path), true));
    }
    Ok((PathBuf::from(DEFAULT_CONFIG_NAME), false))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates paging options.
fn validate_feed(feed: &FeedOptions) -> Result<(), ConfigError> {
    check_range("feed.max_item_count", feed.max_item_count, 1, MAX_ITEM_COUNT)?;
    if let Some(parallelism) = feed.max_degree_of_parallelism {
        check_range("feed.max_degree_of_parallelism", parallelism, 1, u32::MAX)?;
    }
    check_range("feed.max_buffered_item_count", feed.max_buffered_item_count, 1, u32::MAX)
}

/// Checks an inclusive range for a numeric field.
fn check_range(field: &str, value: u32, min: u32, max: u32) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::Invalid(format!("{field} must be between {min} and {max}")));
    }
    Ok(())
}

/// Returns true for non-empty `[A-Za-z0-9_-]+`.
fn is_route_segment(value: &str) -> bool {
    !value.is_empty()
        && value.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

/// Returns true for `[A-Za-z_][A-Za-z0-9_]*`.
fn is_env_var_name(value: &str) -> bool {
    let mut chars = value.chars();
    chars.next().is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Returns the default bind address.
fn default_bind() -> String {
    "127.0.0.1:7071".to_string()
}

/// Returns the default route prefix.
fn default_route_prefix() -> String {
    "/api".to_string()
}

/// Returns the default database identifier.
fn default_database() -> String {
    "TestDB".to_string()
}

/// Returns the default collection identifier.
fn default_collection() -> String {
    "Items".to_string()
}

/// Returns the default partition key attribute.
fn default_partition_key() -> String {
    "customer".to_string()
}

/// Returns the default connection string variable.
fn default_connection_string_env() -> String {
    DEFAULT_CONNECTION_STRING_ENV.to_string()
}

/// Returns the default connect timeout.
const fn default_connect_timeout_ms() -> u64 {
    2_000
}

/// Returns the default request timeout.
const fn default_request_timeout_ms() -> u64 {
    30_000
}

/// Returns the default throttling retry count.
const fn default_max_attempts_on_throttled() -> u32 {
    9
}

/// Returns the default cumulative throttling wait.
const fn default_max_wait_ms() -> u64 {
    30_000
}

/// Returns the default aggregate routes.
fn default_aggregates() -> Vec<AggregateConfig> {
    vec![
        AggregateConfig {
            name: "ItemCountByCustomer".to_string(),
            query_param: "customer".to_string(),
            attribute: "customer".to_string(),
        },
        AggregateConfig {
            name: "ItemCountByProduct".to_string(),
            query_param: "productCode".to_string(),
            attribute: "productCode".to_string(),
        },
    ]
}

/// Returns the default batch count.
const fn default_batch_count() -> u32 {
    10
}

/// Returns the default batch size.
const fn default_documents_per_batch() -> u32 {
    1_000
}

/// Returns the default loader concurrency.
const fn default_max_concurrency() -> u32 {
    16
}

/// Returns the default batch attempt limit.
const fn default_max_batch_attempts() -> u32 {
    5
}

/// Returns the default generator cardinality.
const fn default_cardinality() -> u32 {
    999
}
