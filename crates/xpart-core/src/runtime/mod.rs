// crates/xpart-core/src/runtime/mod.rs
// ============================================================================
// Module: xpart Runtime
// Description: Aggregate executor, feed cursor, shared client, memory store.
// Purpose: Drain paged count feeds against a lazily shared backend client.
// Dependencies: crate::{model, interfaces}, tokio, tokio-util, tracing
// ============================================================================

//! ## Overview
//! The runtime turns an optional filter value into a scoped [`CountQuery`],
//! drives a [`DocumentQuery`] feed to exhaustion, and sums partial counts and
//! cost units. The backend handle is built at most once per [`SharedClient`].
//!
//! [`CountQuery`]: crate::model::CountQuery

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod client;
pub mod executor;
pub mod feed;
pub mod memory;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use client::ClientFactory;
pub use client::ConnectionSource;
pub use client::SharedClient;
pub use executor::AggregateDimension;
pub use executor::AggregateError;
pub use executor::AggregateExecutor;
pub use executor::AggregateResult;
pub use feed::DocumentQuery;
pub use feed::FeedCursor;
pub use memory::InMemoryDocumentStore;
