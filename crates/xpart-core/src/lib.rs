// crates/xpart-core/src/lib.rs
// ============================================================================
// Module: xpart Core Library
// Description: Public API surface for the cross-partition aggregate core.
// Purpose: Expose connection parsing, query types, store interfaces, and runtime.
// Dependencies: crate::{model, interfaces, runtime}
// ============================================================================

//! ## Overview
//! `xpart-core` computes scalar count aggregates over a partitioned document
//! collection. It parses account connection strings, selects a single- or
//! cross-partition execution scope, and drains a paged result feed while
//! accumulating the aggregate and the backend cost units. Backends plug in
//! through the [`DocumentStore`] and [`BulkWriter`] interfaces.
//!
//! Security posture: connection strings carry credentials and filter values
//! are untrusted request input; credentials are never logged and filter
//! values are always bound as query parameters.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod interfaces;
pub mod model;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use model::*;

pub use interfaces::BatchImportReport;
pub use interfaces::BulkWriter;
pub use interfaces::Document;
pub use interfaces::DocumentStore;
pub use interfaces::FeedPage;
pub use interfaces::FeedRequest;
pub use interfaces::QueryMetrics;
pub use interfaces::SharedDocumentStore;
pub use interfaces::StoreError;
pub use runtime::AggregateDimension;
pub use runtime::AggregateError;
pub use runtime::AggregateExecutor;
pub use runtime::AggregateResult;
pub use runtime::ClientFactory;
pub use runtime::ConnectionSource;
pub use runtime::DocumentQuery;
pub use runtime::FeedCursor;
pub use runtime::InMemoryDocumentStore;
pub use runtime::SharedClient;
