use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use snafu::Snafu;

use crate::{
    event::{Matrix, TimeRange},
    http::HttpError,
    internal_events::prelude::error_type,
};

pub mod prometheus;

/// A monitoring system answering range queries.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Evaluates `query` over `range`. Either the whole matrix is returned or
    /// the call fails; there are no partial results.
    async fn query_range(&self, query: &str, range: &TimeRange) -> Result<Matrix, QueryError>;

    /// Checks that the source is reachable before a run starts.
    async fn healthcheck(&self) -> crate::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum QueryError {
    #[snafu(display("Query is empty"))]
    EmptyQuery { query: String },

    #[snafu(display("Range query {:?} failed: {}", query, source))]
    Request { query: String, source: HttpError },

    #[snafu(display("Range query {:?} timed out after {:?}", query, timeout))]
    TimedOut { query: String, timeout: Duration },

    #[snafu(display("Range query {:?} was rejected with {}, check the credentials", query, status))]
    Unauthorized { query: String, status: StatusCode },

    #[snafu(display("Range query {:?} returned {}: {}", query, status, body))]
    HttpStatus {
        query: String,
        status: StatusCode,
        body: String,
    },

    #[snafu(display("Failed to read response of range query {:?}: {}", query, source))]
    ReadBody { query: String, source: hyper::Error },

    #[snafu(display("Failed to decode response of range query {:?}: {}", query, source))]
    Decode {
        query: String,
        source: serde_json::Error,
    },

    #[snafu(display("Range query {:?} failed with {}: {}", query, error_type, error))]
    Api {
        query: String,
        error_type: String,
        error: String,
    },

    #[snafu(display("Range query {:?} returned a {} instead of a matrix", query, result_type))]
    UnexpectedResultType { query: String, result_type: String },
}

impl QueryError {
    pub fn query(&self) -> &str {
        match self {
            QueryError::EmptyQuery { query }
            | QueryError::Request { query, .. }
            | QueryError::TimedOut { query, .. }
            | QueryError::Unauthorized { query, .. }
            | QueryError::HttpStatus { query, .. }
            | QueryError::ReadBody { query, .. }
            | QueryError::Decode { query, .. }
            | QueryError::Api { query, .. }
            | QueryError::UnexpectedResultType { query, .. } => query,
        }
    }

    /// The `error_type` tag of the internal events reporting this error.
    pub const fn error_type(&self) -> &'static str {
        match self {
            QueryError::Request { .. } | QueryError::ReadBody { .. } => error_type::CONNECTION_FAILED,
            QueryError::TimedOut { .. } => error_type::TIMED_OUT,
            QueryError::Decode { .. } | QueryError::UnexpectedResultType { .. } => {
                error_type::PARSER_FAILED
            }
            QueryError::EmptyQuery { .. }
            | QueryError::Unauthorized { .. }
            | QueryError::HttpStatus { .. }
            | QueryError::Api { .. } => error_type::REQUEST_FAILED,
        }
    }
}
