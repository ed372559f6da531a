//! Bounded batch upserts with a per-batch validity gate.
//!
//! Raw records are transformed and written in fixed-size batches. A batch
//! whose validation pass ratio falls below the configured threshold is
//! still written (the valid subset) but surfaces a warning: partial
//! inventory beats no inventory, the ratio is a data-quality signal, not
//! an abort condition. A storage failure on one batch is recorded and does
//! not stop subsequent batches.

use chrono::{DateTime, Datelike, Utc};
use metrics::{counter, histogram};
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::feed::transform::transform;
use crate::repositories::ListingRepository;

/// Aggregated result of pushing one page of raw records through the
/// transform/upsert pipeline.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Raw records attempted, valid or not
    pub attempted: usize,
    /// Listings written to storage
    pub written: u64,
    /// Records rejected by validation
    pub invalid: usize,
    /// Validation error strings, aggregated across batches
    pub errors: Vec<String>,
    /// External ids of every valid record, for sweep reconciliation
    pub external_ids: Vec<i64>,
    /// True when any batch fell below the validity threshold
    pub below_threshold: bool,
}

impl BatchOutcome {
    fn merge(&mut self, other: BatchOutcome) {
        self.attempted += other.attempted;
        self.written += other.written;
        self.invalid += other.invalid;
        self.errors.extend(other.errors);
        self.external_ids.extend(other.external_ids);
        self.below_threshold |= other.below_threshold;
    }
}

/// Writes canonical records to the cache in bounded batches.
pub struct BatchUpserter {
    listings: ListingRepository,
    batch_size: usize,
    validity_threshold: f64,
}

impl BatchUpserter {
    pub fn new(listings: ListingRepository, batch_size: usize, validity_threshold: f64) -> Self {
        Self {
            listings,
            batch_size,
            validity_threshold,
        }
    }

    /// Transform and upsert a page worth of raw records.
    ///
    /// Never fails as a whole: validation failures and per-batch storage
    /// errors are aggregated into the outcome.
    pub async fn upsert_raw(&self, raw_records: &[JsonValue], now: DateTime<Utc>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for chunk in raw_records.chunks(self.batch_size.max(1)) {
            outcome.merge(self.upsert_chunk(chunk, now).await);
        }
        outcome
    }

    async fn upsert_chunk(&self, chunk: &[JsonValue], now: DateTime<Utc>) -> BatchOutcome {
        let current_year = now.year();
        let mut outcome = BatchOutcome {
            attempted: chunk.len(),
            ..BatchOutcome::default()
        };

        let mut valid = Vec::with_capacity(chunk.len());
        for raw in chunk {
            match transform(raw, current_year) {
                Ok(listing) => {
                    outcome.external_ids.push(listing.external_id);
                    valid.push(listing);
                }
                Err(errors) => {
                    outcome.invalid += 1;
                    outcome.errors.extend(errors);
                }
            }
        }

        let ratio = if chunk.is_empty() {
            1.0
        } else {
            valid.len() as f64 / chunk.len() as f64
        };
        histogram!("sync_batch_validity_ratio").record(ratio);

        if ratio < self.validity_threshold {
            outcome.below_threshold = true;
            warn!(
                ratio,
                threshold = self.validity_threshold,
                attempted = chunk.len(),
                valid = valid.len(),
                "Batch validity ratio below threshold, writing valid subset"
            );
        }

        match self.listings.upsert_batch(&valid, now).await {
            Ok(written) => {
                counter!("sync_listings_written_total").increment(written);
                outcome.written = written;
            }
            Err(e) => {
                // Failure isolation: this batch is lost, the sweep goes on.
                warn!(error = %e, batch = chunk.len(), "Batch upsert failed");
                outcome
                    .errors
                    .push(format!("Batch upsert failed: {}", e));
            }
        }

        outcome
    }

    /// Validity ratio for one raw batch without writing anything.
    pub fn validity_ratio(raw_records: &[JsonValue], current_year: i32) -> f64 {
        if raw_records.is_empty() {
            return 1.0;
        }
        let valid = raw_records
            .iter()
            .filter(|raw| transform(raw, current_year).is_ok())
            .count();
        valid as f64 / raw_records.len() as f64
    }
}
