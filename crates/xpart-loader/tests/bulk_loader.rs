// crates/xpart-loader/tests/bulk_loader.rs
// ============================================================================
// Module: Bulk Loader Tests
// Description: Batch submission, re-submission, and cancellation behavior.
// Purpose: Validate loader accounting against memory and scripted writers.
// Dependencies: xpart-loader, xpart-core, tokio
// ============================================================================

//! ## Overview
//! Runs the loader against the in-memory store and against scripted writers
//! that drop documents, stall, or reject the collection.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use xpart_core::BatchImportReport;
use xpart_core::BulkWriter;
use xpart_core::CollectionRef;
use xpart_core::Document;
use xpart_core::InMemoryDocumentStore;
use xpart_core::StoreError;
use xpart_loader::BatchSummary;
use xpart_loader::BulkLoader;
use xpart_loader::DocumentGenerator;
use xpart_loader::LoaderError;
use xpart_loader::LoaderSettings;

fn items() -> CollectionRef {
    CollectionRef::new("TestDB", "Items").unwrap()
}

fn settings(batch_count: u32, documents_per_batch: usize, max_batch_attempts: u32) -> LoaderSettings {
    LoaderSettings {
        batch_count,
        documents_per_batch,
        max_batch_attempts,
    }
}

#[tokio::test]
async fn batches_land_in_the_memory_store() {
    let store = InMemoryDocumentStore::new();
    store.register_collection(&items()).unwrap();
    let loader = BulkLoader::new(Arc::new(store.clone()), items(), settings(3, 20, 2));
    let mut generator = DocumentGenerator::seeded(11, 5, 4);
    let mut seen = Vec::new();

    let summary = loader
        .run(&mut generator, &CancellationToken::new(), |batch| seen.push(batch.clone()))
        .await
        .expect("load");

    assert_eq!(summary.batches, 3);
    assert_eq!(summary.documents_imported, 60);
    assert!((summary.cost_units - 300.0).abs() < 1e-9);
    assert_eq!(store.document_count(&items()).unwrap(), 60);
    assert!(store.partition_count(&items()).unwrap() <= 5);
    assert_eq!(seen.iter().map(|batch| batch.batch).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert!(seen.iter().all(|batch| batch.attempts == 1 && batch.documents_imported == 20));
    assert!((summary.average_cost_per_document().unwrap() - 5.0).abs() < 1e-9);
}

#[tokio::test]
async fn missing_collection_stops_before_writing() {
    let store = InMemoryDocumentStore::new();
    let loader = BulkLoader::new(Arc::new(store), items(), settings(1, 5, 1));
    let mut generator = DocumentGenerator::seeded(1, 5, 5);

    let err = loader.run(&mut generator, &CancellationToken::new(), |_| {}).await.expect_err("missing");

    assert!(matches!(err, LoaderError::Store(StoreError::NotFound(_))));
}

/// Writer that fails a scripted set of indices per submission.
struct DroppingWriter {
    failures: Mutex<Vec<Vec<usize>>>,
    submissions: Mutex<Vec<Vec<String>>>,
}

impl DroppingWriter {
    fn new(failures: Vec<Vec<usize>>) -> Arc<Self> {
        Arc::new(Self {
            failures: Mutex::new(failures),
            submissions: Mutex::new(Vec::new()),
        })
    }

    fn submissions(&self) -> Vec<Vec<String>> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl BulkWriter for DroppingWriter {
    async fn ensure_collection(&self, _collection: &CollectionRef) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert_batch(
        &self,
        _collection: &CollectionRef,
        documents: &[Document],
    ) -> Result<BatchImportReport, StoreError> {
        self.submissions.lock().unwrap().push(documents.iter().map(|doc| doc.id.clone()).collect());
        let mut failures = self.failures.lock().unwrap();
        let failed = if failures.is_empty() { Vec::new() } else { failures.remove(0) };
        let imported = documents.len() - failed.len();
        Ok(BatchImportReport {
            documents_imported: imported as u64,
            cost_units: imported as f64,
            elapsed: Duration::from_millis(10),
            failed,
        })
    }
}

#[tokio::test]
async fn unimported_documents_are_resubmitted() {
    let writer = DroppingWriter::new(vec![vec![3, 1], vec![0]]);
    let loader = BulkLoader::new(writer.clone(), items(), settings(1, 4, 3));
    let mut generator = DocumentGenerator::seeded(5, 10, 10);
    let documents = generator.batch(4).unwrap();
    let ids: Vec<String> = documents.iter().map(|doc| doc.id.clone()).collect();

    let summary = loader.import_batch(0, documents, &CancellationToken::new()).await.expect("batch");

    assert_eq!(summary.attempts, 3);
    assert_eq!(summary.documents_imported, 4);
    assert_eq!(summary.elapsed, Duration::from_millis(30));
    let submissions = writer.submissions();
    assert_eq!(submissions[0], ids);
    assert_eq!(submissions[1], vec![ids[1].clone(), ids[3].clone()]);
    assert_eq!(submissions[2], vec![ids[1].clone()]);
}

#[tokio::test]
async fn exhausted_attempts_report_missing_documents() {
    let writer = DroppingWriter::new(vec![vec![0, 1], vec![0]]);
    let loader = BulkLoader::new(writer, items(), settings(1, 3, 2));
    let mut generator = DocumentGenerator::seeded(9, 10, 10);
    let documents = generator.batch(3).unwrap();

    let err = loader.import_batch(7, documents, &CancellationToken::new()).await.expect_err("incomplete");

    match err {
        LoaderError::Incomplete {
            batch,
            imported,
            missing,
        } => {
            assert_eq!(batch, 7);
            assert_eq!(imported, 2);
            assert_eq!(missing, 1);
        }
        other => panic!("expected incomplete batch, got {other}"),
    }
}

#[tokio::test]
async fn cancellation_between_batches_reports_progress() {
    let writer = DroppingWriter::new(Vec::new());
    let loader = BulkLoader::new(writer, items(), settings(5, 2, 1));
    let mut generator = DocumentGenerator::seeded(2, 10, 10);
    let cancel = CancellationToken::new();
    let observer = cancel.clone();

    let err = loader
        .run(&mut generator, &cancel, |batch| {
            if batch.batch == 1 {
                observer.cancel();
            }
        })
        .await
        .expect_err("cancelled");

    assert!(matches!(
        err,
        LoaderError::Cancelled {
            documents_imported: 4,
        }
    ));
}

/// Writer whose submissions never complete.
struct StallingWriter;

#[async_trait]
impl BulkWriter for StallingWriter {
    async fn ensure_collection(&self, _collection: &CollectionRef) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert_batch(
        &self,
        _collection: &CollectionRef,
        _documents: &[Document],
    ) -> Result<BatchImportReport, StoreError> {
        std::future::pending::<Result<BatchImportReport, StoreError>>().await
    }
}

#[tokio::test]
async fn cancellation_interrupts_an_in_flight_submission() {
    let loader = BulkLoader::new(Arc::new(StallingWriter), items(), settings(1, 2, 1));
    let mut generator = DocumentGenerator::seeded(4, 10, 10);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(5), loader.run(&mut generator, &cancel, |_| {}))
        .await
        .expect("loader returned");

    assert!(matches!(
        result,
        Err(LoaderError::Cancelled {
            documents_imported: 0,
        })
    ));
}

#[test]
fn summary_rates_handle_zero_time_and_zero_documents() {
    let batch = BatchSummary {
        batch: 0,
        documents_imported: 100,
        cost_units: 500.0,
        elapsed: Duration::from_secs(2),
        attempts: 1,
    };
    assert!((batch.writes_per_second().unwrap() - 50.0).abs() < 1e-9);
    assert!((batch.cost_per_second().unwrap() - 250.0).abs() < 1e-9);
    assert!((batch.average_cost_per_document().unwrap() - 5.0).abs() < 1e-9);
    assert!(batch.to_string().contains("inserted 100 docs @ 50 writes/s, 250 RU/s"));

    let empty = BatchSummary {
        batch: 1,
        documents_imported: 0,
        cost_units: 0.0,
        elapsed: Duration::ZERO,
        attempts: 1,
    };
    assert!(empty.writes_per_second().is_none());
    assert!(empty.average_cost_per_document().is_none());
}
