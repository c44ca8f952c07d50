//! In-memory stand-ins for the source and sink, recording what the
//! orchestrator asked of them.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::json;

use crate::{
    event::{LabelSet, Matrix, MetricSample, Series, TimeRange},
    sinks::{DEFAULT_MAX_BATCH_SIZE, InsertProgress, SinkStore, StoreError, insert_in_batches},
    sources::{QueryError, SourceClient},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Provisioned { table: String },
    ProvisionFailed { table: String },
    Fetched { query: String },
    Inserted { table: String, batch: usize, rows: usize },
}

/// Calls shared by a source and a sink, in the order they happened.
#[derive(Clone, Debug, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn record(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    /// Tables successfully provisioned, in completion order.
    pub fn provisioned(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Provisioned { table } => Some(table),
                _ => None,
            })
            .collect()
    }

    /// Sizes of the batches attempted against `table`.
    pub fn batch_sizes(&self, table: &str) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Inserted { table: seen, rows, .. } if seen == table => Some(rows),
                _ => None,
            })
            .collect()
    }
}

#[derive(Clone, Debug)]
enum Reply {
    Series { series: usize, points: usize },
    Fail,
    Malformed,
    Panic,
}

pub struct MockSource {
    log: CallLog,
    replies: HashMap<String, Reply>,
    delays: HashMap<String, Duration>,
}

impl MockSource {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            replies: HashMap::new(),
            delays: HashMap::new(),
        }
    }

    /// Answers `query` with `series` series of `points` points each.
    pub fn with_series(mut self, query: &str, series: usize, points: usize) -> Self {
        self.replies.insert(query.to_owned(), Reply::Series { series, points });
        self
    }

    pub fn failing(mut self, query: &str) -> Self {
        self.replies.insert(query.to_owned(), Reply::Fail);
        self
    }

    /// Answers `query` with a point that is not a `[timestamp, value]` pair.
    pub fn malformed(mut self, query: &str) -> Self {
        self.replies.insert(query.to_owned(), Reply::Malformed);
        self
    }

    pub fn panicking(mut self, query: &str) -> Self {
        self.replies.insert(query.to_owned(), Reply::Panic);
        self
    }

    pub fn with_fetch_delay(mut self, query: &str, delay: Duration) -> Self {
        self.delays.insert(query.to_owned(), delay);
        self
    }
}

fn matrix(range: &TimeRange, series: usize, points: usize) -> Matrix {
    let start = range.start().timestamp() as f64;
    let step = range.step().as_secs_f64();
    Matrix::new(
        (0..series)
            .map(|index| {
                Series::from_points(
                    LabelSet::from([("instance".to_owned(), format!("host-{index}"))]),
                    (0..points).map(|point| (start + point as f64 * step, point as f64)),
                )
            })
            .collect(),
    )
}

#[async_trait]
impl SourceClient for MockSource {
    async fn query_range(&self, query: &str, range: &TimeRange) -> Result<Matrix, QueryError> {
        self.log.record(Call::Fetched {
            query: query.to_owned(),
        });

        if let Some(delay) = self.delays.get(query) {
            tokio::time::sleep(*delay).await;
        }

        match self.replies.get(query) {
            Some(Reply::Series { series, points }) => Ok(matrix(range, *series, *points)),
            Some(Reply::Malformed) => Ok(Matrix::new(vec![Series {
                metric: LabelSet::new(),
                values: vec![json!("not a point")],
            }])),
            Some(Reply::Panic) => panic!("mock source panicked on {query}"),
            Some(Reply::Fail) | None => Err(QueryError::Api {
                query: query.to_owned(),
                error_type: "bad_data".to_owned(),
                error: "mock failure".to_owned(),
            }),
        }
    }
}

pub struct MockSink {
    log: CallLog,
    max_batch_size: usize,
    provision_delays: HashMap<String, Duration>,
    failing_provisions: HashSet<String>,
    failing_batches: HashSet<(String, usize)>,
    batch_delays: HashMap<(String, usize), Duration>,
}

impl MockSink {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            provision_delays: HashMap::new(),
            failing_provisions: HashSet::new(),
            failing_batches: HashSet::new(),
            batch_delays: HashMap::new(),
        }
    }

    pub fn with_provision_delay(mut self, table: &str, delay: Duration) -> Self {
        self.provision_delays.insert(table.to_owned(), delay);
        self
    }

    pub fn failing_provision(mut self, table: &str) -> Self {
        self.failing_provisions.insert(table.to_owned());
        self
    }

    /// Fails the `batch`th insert into `table`.
    pub fn failing_batch(mut self, table: &str, batch: usize) -> Self {
        self.failing_batches.insert((table.to_owned(), batch));
        self
    }

    /// Holds the `batch`th insert into `table` for `delay` before writing it.
    pub fn with_batch_delay(mut self, table: &str, batch: usize, delay: Duration) -> Self {
        self.batch_delays.insert((table.to_owned(), batch), delay);
        self
    }
}

#[async_trait]
impl SinkStore for MockSink {
    async fn ensure_table(&self, table: &str) -> Result<(), StoreError> {
        if let Some(delay) = self.provision_delays.get(table) {
            tokio::time::sleep(*delay).await;
        }

        if self.failing_provisions.contains(table) {
            self.log.record(Call::ProvisionFailed {
                table: table.to_owned(),
            });
            return Err(StoreError::Provision {
                table: table.to_owned(),
                source: "mock provisioning failure".into(),
            });
        }

        self.log.record(Call::Provisioned {
            table: table.to_owned(),
        });
        Ok(())
    }

    async fn batch_insert(
        &self,
        table: &str,
        samples: &[MetricSample],
        progress: &InsertProgress,
    ) -> Result<usize, StoreError> {
        insert_in_batches(table, samples, self.max_batch_size, progress, |batch, chunk| {
            self.log.record(Call::Inserted {
                table: table.to_owned(),
                batch,
                rows: chunk.len(),
            });
            let fails = self.failing_batches.contains(&(table.to_owned(), batch));
            let delay = self.batch_delays.get(&(table.to_owned(), batch)).copied();
            let rows = chunk.len() as u64;
            async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if fails {
                    Err::<u64, crate::Error>("mock batch failure".into())
                } else {
                    Ok(rows)
                }
            }
        })
        .await
    }
}
