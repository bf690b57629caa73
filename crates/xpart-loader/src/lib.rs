// crates/xpart-loader/src/lib.rs
// ============================================================================
// Module: xpart Loader Library
// Description: Synthetic data generation and bulk loading.
// Purpose: Populate a collection with random items in batches.
// Dependencies: crate::{generator, loader}
// ============================================================================

//! ## Overview
//! `xpart-loader` generates random item documents and writes them through a
//! [`xpart_core::BulkWriter`] in fixed-size batches, re-submitting documents
//! the backend did not import and reporting throughput per batch and overall.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod generator;
pub mod loader;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use generator::DocumentGenerator;
pub use generator::ItemDocument;
pub use loader::BatchSummary;
pub use loader::BulkLoader;
pub use loader::LoadSummary;
pub use loader::LoaderError;
pub use loader::LoaderSettings;
