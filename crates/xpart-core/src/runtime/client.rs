// crates/xpart-core/src/runtime/client.rs
// ============================================================================
// Module: Shared Store Client
// Description: Lazily constructed, process-wide document store handle.
// Purpose: Build the backend client at most once across concurrent callers.
// Dependencies: crate::{model, interfaces}, tracing
// ============================================================================

//! ## Overview
//! [`SharedClient`] holds the connection source captured at startup and a
//! [`ClientFactory`]. The first caller parses the connection string and asks
//! the factory for a store; everyone else reads the published handle.
//!
//! Acquisition is double-checked: a lock-free `OnceLock` read on the fast
//! path, then a mutex around the one-time construction with a second check
//! inside it. Failed construction is not cached, so a later request retries.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;

use tracing::info;

use crate::interfaces::SharedDocumentStore;
use crate::interfaces::StoreError;
use crate::model::ConnectionDescriptor;
use crate::runtime::executor::AggregateError;

// ============================================================================
// SECTION: Factory
// ============================================================================

/// Builds a document store from a parsed connection descriptor.
pub trait ClientFactory: Send + Sync {
    /// Constructs the backend client.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the client cannot be built.
    fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<SharedDocumentStore, StoreError>;
}

impl<F> ClientFactory for F
where
    F: Fn(&ConnectionDescriptor) -> Result<SharedDocumentStore, StoreError> + Send + Sync,
{
    fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<SharedDocumentStore, StoreError> {
        self(descriptor)
    }
}

/// Factory slot for clients built from an existing store.
struct PreconnectedFactory;

impl ClientFactory for PreconnectedFactory {
    fn connect(&self, _descriptor: &ConnectionDescriptor) -> Result<SharedDocumentStore, StoreError> {
        Err(StoreError::Unavailable("preconnected client cannot reconnect".to_string()))
    }
}

// ============================================================================
// SECTION: Connection Source
// ============================================================================

/// Raw connection string captured from configuration at startup.
///
/// # Invariants
/// - The raw value is redacted from `Debug` output.
#[derive(Clone)]
pub struct ConnectionSource {
    /// Human-readable origin used in error messages (never the value).
    label: String,
    /// Raw connection string, if one was configured.
    value: Option<String>,
}

impl ConnectionSource {
    /// Creates a source from a label and an optional raw value.
    #[must_use]
    pub fn new(label: impl Into<String>, value: Option<String>) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }

    /// Returns the origin label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the raw connection string.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::Configuration`] when no non-blank value was
    /// configured.
    pub fn resolve(&self) -> Result<&str, AggregateError> {
        match self.value.as_deref() {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(AggregateError::Configuration(format!(
                "connection string '{}' has not been defined",
                self.label
            ))),
        }
    }
}

impl fmt::Debug for ConnectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSource")
            .field("label", &self.label)
            .field("configured", &self.value.is_some())
            .finish()
    }
}

// ============================================================================
// SECTION: Shared Client
// ============================================================================

/// Process-wide document store handle constructed on first use.
///
/// # Invariants
/// - At most one successful construction per instance.
/// - After publication, [`SharedClient::get`] never takes the mutex.
pub struct SharedClient {
    /// Connection string origin and value.
    source: ConnectionSource,
    /// Backend constructor.
    factory: Box<dyn ClientFactory>,
    /// Published store handle.
    handle: OnceLock<SharedDocumentStore>,
    /// Serializes first-time construction.
    init_lock: Mutex<()>,
}

impl SharedClient {
    /// Creates an uninitialized client.
    #[must_use]
    pub fn new(source: ConnectionSource, factory: impl ClientFactory + 'static) -> Self {
        Self {
            source,
            factory: Box::new(factory),
            handle: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// Creates a client that is already bound to a store.
    #[must_use]
    pub fn preconnected(store: SharedDocumentStore) -> Self {
        let handle = OnceLock::new();
        let _ = handle.set(store);
        Self {
            source: ConnectionSource::new("preconnected", None),
            factory: Box::new(PreconnectedFactory),
            handle,
            init_lock: Mutex::new(()),
        }
    }

    /// Returns true once the store handle has been published.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.handle.get().is_some()
    }

    /// Returns the shared store, constructing it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::Configuration`] or [`AggregateError::Format`]
    /// when the connection string is missing or invalid, or the factory
    /// fails.
    pub fn get(&self) -> Result<SharedDocumentStore, AggregateError> {
        if let Some(store) = self.handle.get() {
            return Ok(Arc::clone(store));
        }
        let _guard = self.init_lock.lock().map_err(|_| {
            AggregateError::Configuration("client initialization lock poisoned".to_string())
        })?;
        if let Some(store) = self.handle.get() {
            return Ok(Arc::clone(store));
        }
        let descriptor = ConnectionDescriptor::parse(self.source.resolve()?)?;
        let store = self.factory.connect(&descriptor).map_err(|err| {
            AggregateError::Configuration(format!("document store client construction failed: {err}"))
        })?;
        info!(
            source = self.source.label(),
            endpoint = descriptor.endpoint().as_str(),
            "document store client constructed"
        );
        Ok(Arc::clone(self.handle.get_or_init(|| store)))
    }
}

impl fmt::Debug for SharedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedClient")
            .field("source", &self.source)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}
