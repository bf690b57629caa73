// crates/xpart-config/src/lib.rs
// ============================================================================
// Module: xpart Config Library
// Description: Canonical config model and validation for xpart services.
// Purpose: Single source of truth for xpart.toml semantics.
// Dependencies: xpart-core, serde, toml
// ============================================================================

//! ## Overview
//! `xpart-config` defines the configuration shared by the aggregate server,
//! the bulk loader, and the CLI. Validation is strict and fails closed; the
//! raw connection string is resolved once at startup and handed to the core
//! as an explicit [`xpart_core::ConnectionSource`].
//!
//! Security posture: config inputs are untrusted and may carry credentials;
//! credentials never appear in error messages.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
