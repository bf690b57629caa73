// crates/xpart-server/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Shared fixtures for aggregate server integration tests.
// Purpose: Spawn servers over seeded in-memory stores.
// Dependencies: xpart-server, xpart-core, xpart-config
// ============================================================================

//! ## Overview
//! Builds a memory-backed [`AggregateServer`] seeded with 30 items spread over
//! five customers and three product codes, and serves it on an ephemeral
//! port.

#![allow(
    dead_code,
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Shared helpers are not used by every test binary."
)]

use std::sync::Arc;

use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use xpart_config::StoreKind;
use xpart_config::XpartConfig;
use xpart_core::Document;
use xpart_core::InMemoryDocumentStore;
use xpart_core::PartitionKey;
use xpart_core::SharedClient;
use xpart_server::AggregateServer;
use xpart_server::ServerError;

/// Running server handle.
pub struct RunningServer {
    pub base_url: String,
    pub shutdown: CancellationToken,
    pub task: JoinHandle<Result<(), ServerError>>,
}

impl RunningServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        self.task.await.expect("server task").expect("server result");
    }
}

pub fn memory_config() -> XpartConfig {
    let mut config = XpartConfig::default();
    config.store.kind = StoreKind::Memory;
    config
}

/// Seeds 30 items: customer `i % 5`, product `i % 3`.
pub fn seeded_store(config: &XpartConfig) -> InMemoryDocumentStore {
    let collection = config.store.collection_ref().unwrap();
    let store = InMemoryDocumentStore::new();
    store.register_collection(&collection).unwrap();
    let documents: Vec<Document> = (0 .. 30)
        .map(|index| {
            let customer = (index % 5).to_string();
            let product = (index % 3).to_string();
            Document {
                id: format!("item-{index:02}"),
                partition_key: PartitionKey::new(customer.clone()).unwrap(),
                body: json!({ "id": format!("item-{index:02}"), "customer": customer, "productCode": product }),
            }
        })
        .collect();
    store.seed(&collection, &documents).unwrap();
    store
}

pub async fn spawn(server: AggregateServer) -> RunningServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let shutdown = server.shutdown_token();
    let task = tokio::spawn(server.serve_on(listener));
    RunningServer {
        base_url: format!("http://{addr}"),
        shutdown,
        task,
    }
}

pub async fn spawn_seeded(config: XpartConfig) -> RunningServer {
    let store = seeded_store(&config);
    let client = Arc::new(SharedClient::preconnected(Arc::new(store)));
    spawn(AggregateServer::with_client(config, client).expect("server")).await
}
