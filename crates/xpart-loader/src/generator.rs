// crates/xpart-loader/src/generator.rs
// ============================================================================
// Module: Item Generator
// Description: Random item documents for load testing.
// Purpose: Produce uniformly distributed customers and product codes.
// Dependencies: rand, serde, serde_json, xpart-core
// ============================================================================

//! ## Overview
//! Each [`ItemDocument`] carries a 32-character lowercase hex id, a customer
//! drawn from `0 .. customer_cardinality`, and a product code drawn from
//! `0 .. product_cardinality`. The customer is the partition key. Seeded
//! generators are reproducible.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rand::Rng;
use rand::RngCore;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Deserialize;
use serde::Serialize;
use xpart_core::Document;
use xpart_core::PartitionKey;
use xpart_core::StoreError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Synthetic item written by the loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDocument {
    /// 32 lowercase hex characters.
    pub id: String,
    /// Customer identifier; the partition key.
    pub customer: String,
    /// Product code.
    pub product_code: String,
}

impl ItemDocument {
    /// Converts the item into a routable store document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Rejected`] when the item cannot be encoded.
    pub fn to_document(&self) -> Result<Document, StoreError> {
        let partition_key = PartitionKey::new(self.customer.clone()).map_err(|err| {
            StoreError::Rejected {
                status: 400,
                message: err.to_string(),
            }
        })?;
        let body = serde_json::to_value(self).map_err(|err| StoreError::Rejected {
            status: 400,
            message: format!("item serialization failed: {err}"),
        })?;
        Ok(Document {
            id: self.id.clone(),
            partition_key,
            body,
        })
    }
}

/// Random item source.
#[derive(Debug)]
pub struct DocumentGenerator {
    /// Random source.
    rng: StdRng,
    /// Exclusive upper bound for customer values.
    customer_cardinality: u32,
    /// Exclusive upper bound for product codes.
    product_cardinality: u32,
}

impl DocumentGenerator {
    /// Creates a generator seeded from the operating system.
    #[must_use]
    pub fn new(customer_cardinality: u32, product_cardinality: u32) -> Self {
        Self::with_rng(StdRng::from_entropy(), customer_cardinality, product_cardinality)
    }

    /// Creates a reproducible generator.
    #[must_use]
    pub fn seeded(seed: u64, customer_cardinality: u32, product_cardinality: u32) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), customer_cardinality, product_cardinality)
    }

    /// Builds a generator around `rng`; zero cardinalities are raised to one.
    fn with_rng(rng: StdRng, customer_cardinality: u32, product_cardinality: u32) -> Self {
        Self {
            rng,
            customer_cardinality: customer_cardinality.max(1),
            product_cardinality: product_cardinality.max(1),
        }
    }

    /// Draws one item.
    pub fn next_item(&mut self) -> ItemDocument {
        let id = format!("{:016x}{:016x}", self.rng.next_u64(), self.rng.next_u64());
        ItemDocument {
            id,
            customer: self.rng.gen_range(0 .. self.customer_cardinality).to_string(),
            product_code: self.rng.gen_range(0 .. self.product_cardinality).to_string(),
        }
    }

    /// Draws `size` items as store documents.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when an item cannot be encoded.
    pub fn batch(&mut self, size: usize) -> Result<Vec<Document>, StoreError> {
        (0 .. size).map(|_| self.next_item().to_document()).collect()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
