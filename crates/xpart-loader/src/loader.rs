// crates/xpart-loader/src/loader.rs
// ============================================================================
// Module: Bulk Loader
// Description: Batched upserts with re-submission of unimported documents.
// Purpose: Write generated items and report throughput and cost.
// Dependencies: xpart-core, xpart-config, tokio-util, tracing
// ============================================================================

//! ## Overview
//! [`BulkLoader`] verifies the target collection exists, then writes
//! `batch_count` batches of generated items. A batch is re-submitted with only
//! the documents the backend did not import until it completes or
//! `max_batch_attempts` submissions have been made. Each batch produces a
//! [`BatchSummary`]; the run produces a [`LoadSummary`].
//!
//! Cancellation is honored between batches and while a submission is in
//! flight; a cancelled run reports how many documents were already written.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;
use xpart_config::LoaderConfig;
use xpart_core::BulkWriter;
use xpart_core::CollectionRef;
use xpart_core::Document;
use xpart_core::StoreError;

use crate::generator::DocumentGenerator;

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Batch shape and retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderSettings {
    /// Number of batches to write.
    pub batch_count: u32,
    /// Documents generated per batch.
    pub documents_per_batch: usize,
    /// Submissions of one batch before giving up.
    pub max_batch_attempts: u32,
}

impl From<&LoaderConfig> for LoaderSettings {
    fn from(config: &LoaderConfig) -> Self {
        Self {
            batch_count: config.batch_count,
            documents_per_batch: usize::try_from(config.documents_per_batch).unwrap_or(usize::MAX),
            max_batch_attempts: config.max_batch_attempts,
        }
    }
}

// ============================================================================
// SECTION: Summaries
// ============================================================================

/// Outcome of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    /// Zero-based batch index.
    pub batch: u32,
    /// Documents written.
    pub documents_imported: u64,
    /// Cost units consumed across every submission.
    pub cost_units: f64,
    /// Backend-reported time across every submission.
    pub elapsed: Duration,
    /// Submissions made.
    pub attempts: u32,
}

impl BatchSummary {
    /// Returns documents written per second.
    #[must_use]
    pub fn writes_per_second(&self) -> Option<f64> {
        per_second(as_f64(self.documents_imported), self.elapsed)
    }

    /// Returns cost units consumed per second.
    #[must_use]
    pub fn cost_per_second(&self) -> Option<f64> {
        per_second(self.cost_units, self.elapsed)
    }

    /// Returns the average cost of one document.
    #[must_use]
    pub fn average_cost_per_document(&self) -> Option<f64> {
        average(self.cost_units, self.documents_imported)
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch {}: ", self.batch)?;
        write_throughput(
            f,
            self.documents_imported,
            self.writes_per_second(),
            self.cost_per_second(),
            self.elapsed,
            self.average_cost_per_document(),
        )
    }
}

/// Outcome of a complete run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadSummary {
    /// Batches completed.
    pub batches: u32,
    /// Documents written.
    pub documents_imported: u64,
    /// Cost units consumed.
    pub cost_units: f64,
    /// Sum of batch times.
    pub elapsed: Duration,
}

impl LoadSummary {
    /// Folds one batch into the totals.
    fn record(&mut self, batch: &BatchSummary) {
        self.batches += 1;
        self.documents_imported += batch.documents_imported;
        self.cost_units += batch.cost_units;
        self.elapsed += batch.elapsed;
    }

    /// Returns documents written per second.
    #[must_use]
    pub fn writes_per_second(&self) -> Option<f64> {
        per_second(as_f64(self.documents_imported), self.elapsed)
    }

    /// Returns cost units consumed per second.
    #[must_use]
    pub fn cost_per_second(&self) -> Option<f64> {
        per_second(self.cost_units, self.elapsed)
    }

    /// Returns the average cost of one document.
    #[must_use]
    pub fn average_cost_per_document(&self) -> Option<f64> {
        average(self.cost_units, self.documents_imported)
    }
}

impl fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "overall ({} batches): ", self.batches)?;
        write_throughput(
            f,
            self.documents_imported,
            self.writes_per_second(),
            self.cost_per_second(),
            self.elapsed,
            self.average_cost_per_document(),
        )
    }
}

// ============================================================================
// SECTION: Loader
// ============================================================================

/// Writes generated batches through a [`BulkWriter`].
pub struct BulkLoader {
    /// Target backend.
    writer: Arc<dyn BulkWriter>,
    /// Target collection.
    collection: CollectionRef,
    /// Batch shape and retry budget.
    settings: LoaderSettings,
}

impl BulkLoader {
    /// Creates a loader.
    #[must_use]
    pub fn new(writer: Arc<dyn BulkWriter>, collection: CollectionRef, settings: LoaderSettings) -> Self {
        Self {
            writer,
            collection,
            settings,
        }
    }

    /// Generates and writes every batch.
    ///
    /// `on_batch` observes each completed batch.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Store`] when the collection is missing or a
    /// submission fails as a whole, [`LoaderError::Incomplete`] when a batch
    /// exhausts its attempts, and [`LoaderError::Cancelled`] on cancellation.
    pub async fn run(
        &self,
        generator: &mut DocumentGenerator,
        cancel: &CancellationToken,
        mut on_batch: impl FnMut(&BatchSummary),
    ) -> Result<LoadSummary, LoaderError> {
        self.writer.ensure_collection(&self.collection).await?;
        let mut summary = LoadSummary::default();
        for batch in 0 .. self.settings.batch_count {
            if cancel.is_cancelled() {
                return Err(LoaderError::Cancelled {
                    documents_imported: summary.documents_imported,
                });
            }
            let documents = generator.batch(self.settings.documents_per_batch)?;
            let result = self.import_batch(batch, documents, cancel).await.map_err(|err| match err {
                LoaderError::Cancelled {
                    documents_imported,
                } => LoaderError::Cancelled {
                    documents_imported: summary.documents_imported + documents_imported,
                },
                other => other,
            })?;
            info!(
                batch,
                imported = result.documents_imported,
                attempts = result.attempts,
                cost_units = result.cost_units,
                elapsed_ms = u64::try_from(result.elapsed.as_millis()).unwrap_or(u64::MAX),
                writes_per_second = result.writes_per_second().unwrap_or_default(),
                cost_per_second = result.cost_per_second().unwrap_or_default(),
                "batch imported"
            );
            on_batch(&result);
            summary.record(&result);
        }
        info!(
            batches = summary.batches,
            imported = summary.documents_imported,
            cost_units = summary.cost_units,
            "load complete"
        );
        Ok(summary)
    }

    /// Writes one batch, re-submitting documents the backend did not import.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError`] as described on [`BulkLoader::run`].
    pub async fn import_batch(
        &self,
        batch: u32,
        documents: Vec<Document>,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary, LoaderError> {
        let mut pending = documents;
        let mut summary = BatchSummary {
            batch,
            documents_imported: 0,
            cost_units: 0.0,
            elapsed: Duration::ZERO,
            attempts: 0,
        };
        while !pending.is_empty() {
            if summary.attempts >= self.settings.max_batch_attempts {
                return Err(LoaderError::Incomplete {
                    batch,
                    imported: summary.documents_imported,
                    missing: pending.len(),
                });
            }
            summary.attempts += 1;
            let report = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(LoaderError::Cancelled {
                        documents_imported: summary.documents_imported,
                    });
                }
                report = self.writer.upsert_batch(&self.collection, &pending) => report?,
            };
            summary.documents_imported += report.documents_imported;
            summary.cost_units += report.cost_units;
            summary.elapsed += report.elapsed;
            if !report.failed.is_empty() {
                warn!(
                    batch,
                    attempt = summary.attempts,
                    failed = report.failed.len(),
                    "batch partially imported; re-submitting failed documents"
                );
            }
            pending = retain_failed(pending, &report.failed);
        }
        Ok(summary)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Loader failures.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Backend failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The run was cancelled.
    #[error("load cancelled after {documents_imported} documents")]
    Cancelled {
        /// Documents written before cancellation.
        documents_imported: u64,
    },
    /// A batch exhausted its attempts.
    #[error("batch {batch} incomplete: {imported} imported, {missing} not imported")]
    Incomplete {
        /// Zero-based batch index.
        batch: u32,
        /// Documents written for the batch.
        imported: u64,
        /// Documents still unwritten.
        missing: usize,
    },
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Keeps the documents at the failed indices.
fn retain_failed(documents: Vec<Document>, failed: &[usize]) -> Vec<Document> {
    let mut failed = failed.to_vec();
    failed.sort_unstable();
    documents
        .into_iter()
        .enumerate()
        .filter(|(index, _)| failed.binary_search(index).is_ok())
        .map(|(_, document)| document)
        .collect()
}

/// Converts a document count for rate arithmetic.
#[allow(clippy::cast_precision_loss, reason = "Document counts stay far below 2^52.")]
const fn as_f64(value: u64) -> f64 {
    value as f64
}

/// Returns `amount / elapsed` in seconds, or `None` for zero time.
fn per_second(amount: f64, elapsed: Duration) -> Option<f64> {
    let seconds = elapsed.as_secs_f64();
    (seconds > 0.0).then(|| amount / seconds)
}

/// Returns `cost / documents`, or `None` when nothing was written.
fn average(cost: f64, documents: u64) -> Option<f64> {
    (documents > 0).then(|| cost / as_f64(documents))
}

/// Writes the shared throughput line.
fn write_throughput(
    f: &mut fmt::Formatter<'_>,
    documents: u64,
    writes_per_second: Option<f64>,
    cost_per_second: Option<f64>,
    elapsed: Duration,
    average_cost: Option<f64>,
) -> fmt::Result {
    write!(
        f,
        "inserted {documents} docs @ {:.0} writes/s, {:.0} RU/s in {:.3} sec; average {:.2} RU per \
         document",
        writes_per_second.unwrap_or_default(),
        cost_per_second.unwrap_or_default(),
        elapsed.as_secs_f64(),
        average_cost.unwrap_or_default()
    )
}
