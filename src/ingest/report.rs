use std::{fmt, time::Duration};

use crate::{
    config::QuerySpec,
    internal_events::prelude::{error_stage, error_type},
};

/// The step of a query's pipeline that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Provision,
    Fetch,
    Insert,
    /// The pipeline task itself died.
    Task,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Stage::Provision => "provision",
            Stage::Fetch => "fetch",
            Stage::Insert => "insert",
            Stage::Task => "task",
        }
    }

    pub const fn error_stage(self) -> &'static str {
        match self {
            Stage::Provision => error_stage::PROVISIONING,
            Stage::Fetch => error_stage::RECEIVING,
            Stage::Insert => error_stage::SENDING,
            Stage::Task => error_stage::PROCESSING,
        }
    }

    pub const fn error_type(self) -> &'static str {
        match self {
            Stage::Provision | Stage::Insert => error_type::WRITER_FAILED,
            Stage::Fetch | Stage::Task => error_type::REQUEST_FAILED,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct Failure {
    pub stage: Stage,
    pub cause: crate::Error,
}

/// How one query's pipeline ended.
#[derive(Debug)]
pub struct QueryOutcome {
    pub query: QuerySpec,
    /// Rows written, including those written before a failure.
    pub inserted: usize,
    pub failure: Option<Failure>,
}

impl QueryOutcome {
    pub(super) fn succeeded(query: QuerySpec, inserted: usize) -> Self {
        Self {
            query,
            inserted,
            failure: None,
        }
    }

    pub(super) fn failed(query: QuerySpec, stage: Stage, cause: impl Into<crate::Error>, inserted: usize) -> Self {
        Self {
            query,
            inserted,
            failure: Some(Failure {
                stage,
                cause: cause.into(),
            }),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

impl fmt::Display for QueryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure {
            None => write!(
                f,
                "{}: inserted {} rows into {}",
                self.query,
                self.inserted,
                self.query.target_table()
            ),
            Some(failure) => write!(
                f,
                "{}: failed during {} after inserting {} rows: {}",
                self.query, failure.stage, self.inserted, failure.cause
            ),
        }
    }
}

/// The aggregated result of a run, one outcome per query in configuration order.
#[derive(Debug)]
pub struct RunReport {
    pub outcomes: Vec<QueryOutcome>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn inserted(&self) -> usize {
        self.outcomes.iter().map(|outcome| outcome.inserted).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &QueryOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn outcome(&self, query: &str) -> Option<&QueryOutcome> {
        self.outcomes.iter().find(|outcome| outcome.query.name() == query)
    }

    pub fn exit_code(&self) -> exitcode::ExitCode {
        if self.is_success() {
            exitcode::OK
        } else {
            exitcode::SOFTWARE
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            writeln!(f, "{outcome}")?;
        }
        write!(
            f,
            "{} queries attempted, {} failed, {} rows inserted in {:.1?}",
            self.attempted(),
            self.failures().count(),
            self.inserted(),
            self.elapsed
        )
    }
}
