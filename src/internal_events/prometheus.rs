use std::time::Duration;

use metrics::{counter, histogram};

use super::{
    InternalEvent,
    prelude::{error_stage, error_type},
};

#[derive(Debug)]
pub struct PrometheusRangeQueryCompleted<'a> {
    pub query: &'a str,
    pub series: usize,
    pub points: usize,
    pub elapsed: Duration,
}

impl InternalEvent for PrometheusRangeQueryCompleted<'_> {
    fn emit(self) {
        debug!(
            message = "Range query completed.",
            query = %self.query,
            series = self.series,
            points = self.points,
        );
        counter!("range_queries_completed_total").increment(1);
        counter!("range_query_points_received_total").increment(self.points as u64);
        histogram!("range_query_duration_seconds").record(self.elapsed);
    }

    fn name(&self) -> Option<&'static str> {
        Some("PrometheusRangeQueryCompleted")
    }
}

#[derive(Debug)]
pub struct PrometheusRangeQueryError<'a, E> {
    pub query: &'a str,
    pub error: &'a E,
    pub error_type: &'static str,
}

impl<E: std::fmt::Display> InternalEvent for PrometheusRangeQueryError<'_, E> {
    fn emit(self) {
        error!(
            message = "Range query failed.",
            query = %self.query,
            error = %self.error,
            error_type = self.error_type,
            stage = error_stage::RECEIVING,
        );
        counter!(
            "component_errors_total",
            "error_type" => self.error_type,
            "stage" => error_stage::RECEIVING,
        )
        .increment(1);
    }

    fn name(&self) -> Option<&'static str> {
        Some("PrometheusRangeQueryError")
    }
}

#[derive(Debug)]
pub struct PrometheusHealthcheckError<'a, E> {
    pub endpoint: &'a str,
    pub error: &'a E,
}

impl<E: std::fmt::Display> InternalEvent for PrometheusHealthcheckError<'_, E> {
    fn emit(self) {
        error!(
            message = "Source healthcheck failed.",
            endpoint = %self.endpoint,
            error = %self.error,
            error_type = error_type::CONNECTION_FAILED,
            stage = error_stage::PROVISIONING,
        );
        counter!(
            "component_errors_total",
            "error_type" => error_type::CONNECTION_FAILED,
            "stage" => error_stage::PROVISIONING,
        )
        .increment(1);
    }
}
