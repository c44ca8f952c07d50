//! Runs one ingestion pipeline per query.
//!
//! A run has two phases. First every query's table is provisioned, all at
//! once, and the run waits until each attempt has finished. Only then does
//! the second phase spawn a task per successfully provisioned query that
//! fetches its range, transforms the matrix and inserts the samples. Tasks
//! never observe each other: a failure ends that query's pipeline and is
//! recorded in its own outcome slot.

use std::{future::Future, sync::Arc, time::Duration};

use futures::future::join_all;
use snafu::Snafu;
use tokio::time::Instant;

use crate::{
    config::QuerySpec,
    event::TimeRange,
    internal_events::{
        EmptyRangeResult, IngestRunCompleted, MatrixTransformError, ProvisioningCompleted,
        QueryFailed, QueryIngested,
    },
    sinks::{InsertProgress, SinkStore},
    sources::SourceClient,
    transforms::to_samples,
};

mod report;

pub use report::{Failure, QueryOutcome, RunReport, Stage};

#[derive(Debug, Snafu)]
pub enum IngestError {
    #[snafu(display("Run deadline of {:?} exceeded", timeout))]
    DeadlineExceeded { timeout: Duration },
}

#[derive(Clone, Copy, Debug)]
struct Deadline {
    at: Instant,
    timeout: Duration,
}

/// Awaits `operation`, giving up once `deadline` has passed.
async fn within<T, E>(
    deadline: Option<Deadline>,
    operation: impl Future<Output = Result<T, E>>,
) -> Result<Result<T, E>, IngestError> {
    match deadline {
        None => Ok(operation.await),
        Some(Deadline { at, timeout }) => tokio::time::timeout_at(at, operation)
            .await
            .map_err(|_| IngestError::DeadlineExceeded { timeout }),
    }
}

pub struct Orchestrator {
    source: Arc<dyn SourceClient>,
    sink: Arc<dyn SinkStore>,
    queries: Vec<QuerySpec>,
    range: TimeRange,
    run_timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn SourceClient>,
        sink: Arc<dyn SinkStore>,
        queries: Vec<QuerySpec>,
        range: TimeRange,
    ) -> Self {
        Self {
            source,
            sink,
            queries,
            range,
            run_timeout: None,
        }
    }

    /// Bounds the whole run. Pipelines still running at the deadline are
    /// reported as failed in the stage they were in.
    pub fn with_run_timeout(mut self, run_timeout: Option<Duration>) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    pub async fn run(&self) -> RunReport {
        let start = Instant::now();
        let deadline = self.run_timeout.map(|timeout| Deadline {
            at: start + timeout,
            timeout,
        });

        let mut outcomes: Vec<Option<QueryOutcome>> = self.queries.iter().map(|_| None).collect();

        let provisioned = join_all(self.queries.iter().map(|query| async move {
            within(deadline, self.sink.ensure_table(query.target_table())).await
        }))
        .await;

        let mut ready = Vec::with_capacity(self.queries.len());
        for (index, (query, result)) in self.queries.iter().zip(provisioned).enumerate() {
            let cause: crate::Error = match result {
                Ok(Ok(())) => {
                    ready.push(index);
                    continue;
                }
                Ok(Err(error)) => error.into(),
                Err(error) => error.into(),
            };
            outcomes[index] = Some(failed(query.clone(), Stage::Provision, cause, 0));
        }

        emit!(ProvisioningCompleted {
            provisioned: ready.len(),
            failed: self.queries.len() - ready.len(),
        });

        let pipelines: Vec<_> = ready
            .into_iter()
            .map(|index| {
                let query = self.queries[index].clone();
                let task = tokio::spawn(ingest(
                    Arc::clone(&self.source),
                    Arc::clone(&self.sink),
                    query.clone(),
                    self.range,
                    deadline,
                ));
                (index, query, task)
            })
            .collect();

        for (index, query, task) in pipelines {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(error) => failed(query, Stage::Task, error, 0),
            };
            outcomes[index] = Some(outcome);
        }

        let report = RunReport {
            outcomes: outcomes.into_iter().flatten().collect(),
            elapsed: start.elapsed(),
        };
        emit!(IngestRunCompleted {
            attempted: report.attempted(),
            failed: report.failures().count(),
            inserted: report.inserted(),
            elapsed: report.elapsed,
        });
        report
    }
}

fn failed(query: QuerySpec, stage: Stage, cause: impl Into<crate::Error>, inserted: usize) -> QueryOutcome {
    let cause = cause.into();
    emit!(QueryFailed {
        query: query.name(),
        stage,
        error: &cause,
        inserted,
    });
    QueryOutcome::failed(query, stage, cause, inserted)
}

/// Fetch, transform and insert for a single provisioned query.
async fn ingest(
    source: Arc<dyn SourceClient>,
    sink: Arc<dyn SinkStore>,
    query: QuerySpec,
    range: TimeRange,
    deadline: Option<Deadline>,
) -> QueryOutcome {
    let start = Instant::now();

    let matrix = match within(deadline, source.query_range(query.name(), &range)).await {
        Ok(Ok(matrix)) => matrix,
        Ok(Err(error)) => return failed(query, Stage::Fetch, error, 0),
        Err(error) => return failed(query, Stage::Fetch, error, 0),
    };

    // A malformed matrix holds nothing worth inserting.
    let samples = to_samples(&matrix, &range).unwrap_or_else(|error| {
        emit!(MatrixTransformError {
            query: query.name(),
            error: &error,
        });
        Vec::new()
    });

    let inserted = if samples.is_empty() {
        emit!(EmptyRangeResult {
            query: query.name()
        });
        0
    } else {
        let progress = InsertProgress::default();
        match within(deadline, sink.batch_insert(query.target_table(), &samples, &progress)).await {
            Ok(Ok(inserted)) => inserted,
            Ok(Err(error)) => {
                let inserted = error.inserted();
                return failed(query, Stage::Insert, error, inserted);
            }
            Err(error) => return failed(query, Stage::Insert, error, progress.committed()),
        }
    };

    emit!(QueryIngested {
        query: query.name(),
        table: query.target_table(),
        inserted,
        elapsed: start.elapsed(),
    });
    QueryOutcome::succeeded(query, inserted)
}
