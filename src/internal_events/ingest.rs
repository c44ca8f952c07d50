use std::time::Duration;

use metrics::{counter, histogram};

use super::{
    InternalEvent,
    prelude::{error_stage, error_type},
};
use crate::ingest::Stage;

#[derive(Debug)]
pub struct ProvisioningCompleted {
    pub provisioned: usize,
    pub failed: usize,
}

impl InternalEvent for ProvisioningCompleted {
    fn emit(self) {
        info!(
            message = "Provisioning completed.",
            provisioned = self.provisioned,
            failed = self.failed,
        );
    }

    fn name(&self) -> Option<&'static str> {
        Some("ProvisioningCompleted")
    }
}

#[derive(Debug)]
pub struct MatrixTransformError<'a, E> {
    pub query: &'a str,
    pub error: &'a E,
}

impl<E: std::fmt::Display> InternalEvent for MatrixTransformError<'_, E> {
    fn emit(self) {
        warn!(
            message = "Discarding malformed range query result.",
            query = %self.query,
            error = %self.error,
            error_type = error_type::CONVERSION_FAILED,
            stage = error_stage::PROCESSING,
        );
        counter!(
            "component_errors_total",
            "error_type" => error_type::CONVERSION_FAILED,
            "stage" => error_stage::PROCESSING,
        )
        .increment(1);
    }

    fn name(&self) -> Option<&'static str> {
        Some("MatrixTransformError")
    }
}

#[derive(Debug)]
pub struct EmptyRangeResult<'a> {
    pub query: &'a str,
}

impl InternalEvent for EmptyRangeResult<'_> {
    fn emit(self) {
        debug!(message = "Range query returned no samples.", query = %self.query);
        counter!("empty_range_results_total").increment(1);
    }

    fn name(&self) -> Option<&'static str> {
        Some("EmptyRangeResult")
    }
}

#[derive(Debug)]
pub struct QueryIngested<'a> {
    pub query: &'a str,
    pub table: &'a str,
    pub inserted: usize,
    pub elapsed: Duration,
}

impl InternalEvent for QueryIngested<'_> {
    fn emit(self) {
        info!(
            message = "Query ingested.",
            query = %self.query,
            table = %self.table,
            inserted = self.inserted,
        );
        counter!("queries_ingested_total").increment(1);
        histogram!("query_pipeline_duration_seconds").record(self.elapsed);
    }

    fn name(&self) -> Option<&'static str> {
        Some("QueryIngested")
    }
}

#[derive(Debug)]
pub struct QueryFailed<'a, E> {
    pub query: &'a str,
    pub stage: Stage,
    pub error: &'a E,
    pub inserted: usize,
}

impl<E: std::fmt::Display> InternalEvent for QueryFailed<'_, E> {
    fn emit(self) {
        let stage = self.stage.error_stage();
        error!(
            message = "Query failed.",
            query = %self.query,
            failed_stage = %self.stage,
            inserted = self.inserted,
            error = %self.error,
            error_type = self.stage.error_type(),
            stage = stage,
        );
        counter!(
            "component_errors_total",
            "error_type" => self.stage.error_type(),
            "stage" => stage,
        )
        .increment(1);
        counter!("queries_failed_total", "failed_stage" => self.stage.as_str()).increment(1);
    }

    fn name(&self) -> Option<&'static str> {
        Some("QueryFailed")
    }
}

#[derive(Debug)]
pub struct IngestRunCompleted {
    pub attempted: usize,
    pub failed: usize,
    pub inserted: usize,
    pub elapsed: Duration,
}

impl InternalEvent for IngestRunCompleted {
    fn emit(self) {
        if self.failed == 0 {
            info!(
                message = "Ingestion run completed.",
                attempted = self.attempted,
                inserted = self.inserted,
            );
        } else {
            warn!(
                message = "Ingestion run completed with failures.",
                attempted = self.attempted,
                failed = self.failed,
                inserted = self.inserted,
            );
        }
        histogram!("ingest_run_duration_seconds").record(self.elapsed);
    }

    fn name(&self) -> Option<&'static str> {
        Some("IngestRunCompleted")
    }
}
