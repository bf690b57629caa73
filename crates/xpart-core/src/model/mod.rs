// crates/xpart-core/src/model/mod.rs
// ============================================================================
// Module: xpart Model Types
// Description: Connection descriptors and query model types.
// Purpose: Group the backend-agnostic value types used by the runtime.
// Dependencies: serde, url
// ============================================================================

//! ## Overview
//! Core types are plain values: the parsed account connection, the collection
//! reference, and the count query model with its execution scope.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod connection;
pub mod query;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use connection::ACCOUNT_ENDPOINT_KEY;
pub use connection::ACCOUNT_KEY_KEY;
pub use connection::ConnectionDescriptor;
pub use connection::ConnectionErrorKind;
pub use connection::ConnectionSettings;
pub use connection::ConnectionStringError;
pub use query::AttributePath;
pub use query::CollectionRef;
pub use query::CountQuery;
pub use query::EqualityFilter;
pub use query::FILTER_PARAMETER;
pub use query::FeedOptions;
pub use query::PartitionKey;
pub use query::QueryError;
pub use query::QueryParameter;
pub use query::QueryScope;
pub use query::QuerySpec;
