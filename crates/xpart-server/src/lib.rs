// crates/xpart-server/src/lib.rs
// ============================================================================
// Module: xpart Server Library
// Description: HTTP surface for cross-partition count aggregates.
// Purpose: Expose the aggregate server and its response types.
// Dependencies: crate::server
// ============================================================================

//! ## Overview
//! `xpart-server` serves the configured aggregates over HTTP using axum. One
//! store client is shared by every route and built on first use.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use server::AggregateResponse;
pub use server::AggregateServer;
pub use server::ServerError;
pub use server::http_store_config;
