// crates/xpart-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Shared helpers for xpart-core integration tests.
// Purpose: Provide scripted stores and executor builders.
// Dependencies: xpart-core, async-trait, serde_json
// ============================================================================

//! ## Overview
//! Provides a scripted [`DocumentStore`] that replays a fixed page sequence
//! and records every request it receives.

#![allow(
    dead_code,
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Shared helpers are not used by every test binary."
)]

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use xpart_core::AggregateDimension;
use xpart_core::AggregateExecutor;
use xpart_core::AttributePath;
use xpart_core::CollectionRef;
use xpart_core::Document;
use xpart_core::DocumentStore;
use xpart_core::FeedOptions;
use xpart_core::FeedPage;
use xpart_core::FeedRequest;
use xpart_core::PartitionKey;
use xpart_core::QueryScope;
use xpart_core::SharedClient;
use xpart_core::StoreError;

/// Connection string used across tests.
pub const CONNECTION_STRING: &str = "AccountEndpoint=https://x.example/;AccountKey=abc123";

/// Request details captured by [`ScriptedStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub query: String,
    pub scope: QueryScope,
    pub continuation: Option<String>,
}

/// Store replaying scripted page results in order.
///
/// Continuation tokens are generated automatically: every scripted page but
/// the last reports `page-{n}`.
pub struct ScriptedStore {
    script: Vec<Result<(Vec<i64>, f64), StoreError>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedStore {
    pub fn new(script: Vec<Result<(Vec<i64>, f64), StoreError>>) -> Arc<Self> {
        Arc::new(Self {
            script,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn pages(pages: &[(Vec<i64>, f64)]) -> Arc<Self> {
        Self::new(pages.iter().cloned().map(Ok).collect())
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn query_page(&self, request: FeedRequest<'_>) -> Result<FeedPage, StoreError> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(RecordedRequest {
                query: request.query.to_query_spec().query,
                scope: request.scope.clone(),
                continuation: request.continuation.map(str::to_string),
            });
            requests.len() - 1
        };
        let Some(step) = self.script.get(index) else {
            panic!("feed requested page {index} beyond the script");
        };
        let (items, cost_units) = step.clone()?;
        let continuation = (index + 1 < self.script.len()).then(|| format!("page-{}", index + 1));
        Ok(FeedPage {
            items,
            cost_units,
            continuation,
            ..FeedPage::default()
        })
    }
}

pub fn items_collection() -> CollectionRef {
    CollectionRef::new("TestDB", "Items").unwrap()
}

pub fn by_customer() -> AggregateDimension {
    AggregateDimension::new("ItemCountByCustomer", AttributePath::parse("customer").unwrap(), true)
}

pub fn by_product() -> AggregateDimension {
    AggregateDimension::new(
        "ItemCountByProduct",
        AttributePath::parse("productCode").unwrap(),
        false,
    )
}

pub fn executor_over(store: Arc<dyn DocumentStore>, dimension: AggregateDimension) -> AggregateExecutor {
    AggregateExecutor::new(
        Arc::new(SharedClient::preconnected(store)),
        items_collection(),
        dimension,
        FeedOptions::default(),
    )
}

pub fn item(id: &str, customer: u32, product: u32) -> Document {
    Document {
        id: id.to_string(),
        partition_key: PartitionKey::new(customer.to_string()).unwrap(),
        body: json!({"id": id, "customer": customer, "productCode": product}),
    }
}
