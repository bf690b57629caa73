// crates/xpart-store-http/src/lib.rs
// ============================================================================
// Module: xpart HTTP Store Library
// Description: REST-backed document store for count queries and upserts.
// Purpose: Expose the HTTP store, its factory, and request signing.
// Dependencies: crate::{auth, retry, store}
// ============================================================================

//! ## Overview
//! `xpart-store-http` implements [`xpart_core::DocumentStore`] and
//! [`xpart_core::BulkWriter`] over the account REST interface. Requests are
//! signed with the account master key and throttled requests are retried
//! within a bounded budget.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod auth;
pub mod retry;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use auth::MasterKey;
pub use retry::RetryPolicy;
pub use store::HttpDocumentStore;
pub use store::HttpStoreConfig;
pub use store::HttpStoreFactory;
