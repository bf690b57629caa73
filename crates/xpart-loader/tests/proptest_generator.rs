// crates/xpart-loader/tests/proptest_generator.rs
// ============================================================================
// Module: Generator Property Tests
// Description: Property checks for synthetic item generation.
// Purpose: Ensure ids and drawn values always respect their bounds.
// Dependencies: xpart-loader, proptest
// ============================================================================

//! ## Overview
//! Checks id shape and value ranges across arbitrary seeds and cardinalities.

use proptest::prelude::*;
use xpart_loader::DocumentGenerator;

proptest! {
    #[test]
    fn items_respect_shape_and_cardinality(
        seed in any::<u64>(),
        customers in 1_u32 .. 2000,
        products in 1_u32 .. 2000,
    ) {
        let mut generator = DocumentGenerator::seeded(seed, customers, products);
        for _ in 0 .. 8 {
            let item = generator.next_item();
            prop_assert_eq!(item.id.len(), 32);
            prop_assert!(item.id.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
            let customer: u32 = item.customer.parse().map_err(|_| TestCaseError::fail("customer"))?;
            let product: u32 = item.product_code.parse().map_err(|_| TestCaseError::fail("product"))?;
            prop_assert!(customer < customers);
            prop_assert!(product < products);
        }
    }
}
