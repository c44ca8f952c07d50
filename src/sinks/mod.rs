use std::{
    fmt,
    future::Future,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use snafu::Snafu;

use crate::event::MetricSample;

pub mod postgres;

/// Rows written per batch unless configured otherwise.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;

/// Storage for the samples of a run, one table per query.
#[async_trait]
pub trait SinkStore: Send + Sync {
    /// Makes sure `table` exists with the sample schema. Safe to call any
    /// number of times, concurrently, for the same table.
    async fn ensure_table(&self, table: &str) -> Result<(), StoreError>;

    /// Writes every sample into `table`, split into batches no larger than
    /// the configured maximum, and returns the number of rows written.
    /// Each committed batch is added to `progress` as soon as it lands.
    async fn batch_insert(
        &self,
        table: &str,
        samples: &[MetricSample],
        progress: &InsertProgress,
    ) -> Result<usize, StoreError>;
}

/// Rows committed so far by a `batch_insert` call. Stays readable when the
/// call is abandoned halfway.
#[derive(Debug, Default)]
pub struct InsertProgress(AtomicUsize);

impl InsertProgress {
    pub fn committed(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn add(&self, rows: usize) {
        self.0.fetch_add(rows, Ordering::AcqRel);
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    #[snafu(display("Failed to provision table {:?}: {}", table, source))]
    Provision { table: String, source: crate::Error },

    #[snafu(display(
        "Inserted {} of {} rows into {:?}, {} batch(es) failed: {}",
        inserted,
        attempted,
        table,
        failures.len(),
        FormatFailures(failures)
    ))]
    Insert {
        table: String,
        inserted: usize,
        attempted: usize,
        failures: Vec<BatchFailure>,
    },
}

impl StoreError {
    /// Rows that were written despite the error.
    pub const fn inserted(&self) -> usize {
        match self {
            StoreError::Provision { .. } => 0,
            StoreError::Insert { inserted, .. } => *inserted,
        }
    }
}

/// One batch that could not be written.
#[derive(Debug)]
pub struct BatchFailure {
    pub batch: usize,
    pub rows: usize,
    pub error: crate::Error,
}

struct FormatFailures<'a>(&'a [BatchFailure]);

impl fmt::Display for FormatFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, failure) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "batch {} ({} rows): {}", failure.batch, failure.rows, failure.error)?;
        }
        Ok(())
    }
}

/// Number of batches needed to write `len` rows.
pub const fn batch_count(len: usize, max_batch_size: usize) -> usize {
    len.div_ceil(max_batch_size)
}

/// Splits `samples` into batches of at most `max_batch_size` and hands each
/// one to `write` in order. A failed batch does not stop the remaining ones;
/// its error is collected and the call fails once every batch was attempted.
pub async fn insert_in_batches<'a, F, Fut>(
    table: &str,
    samples: &'a [MetricSample],
    max_batch_size: usize,
    progress: &InsertProgress,
    mut write: F,
) -> Result<usize, StoreError>
where
    F: FnMut(usize, &'a [MetricSample]) -> Fut,
    Fut: Future<Output = Result<u64, crate::Error>>,
{
    let max_batch_size = max_batch_size.max(1);
    let mut inserted = 0;
    let mut failures = Vec::new();

    for (batch, chunk) in samples.chunks(max_batch_size).enumerate() {
        match write(batch, chunk).await {
            Ok(rows) => {
                inserted += rows as usize;
                progress.add(rows as usize);
            }
            Err(error) => {
                emit!(crate::internal_events::PostgresBatchInsertError {
                    table,
                    batch,
                    rows: chunk.len(),
                    error: &error,
                });
                failures.push(BatchFailure {
                    batch,
                    rows: chunk.len(),
                    error,
                });
            }
        }
    }

    if failures.is_empty() {
        Ok(inserted)
    } else {
        InsertSnafu {
            table,
            inserted,
            attempted: samples.len(),
            failures,
        }
        .fail()
    }
}
