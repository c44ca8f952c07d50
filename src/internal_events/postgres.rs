use std::time::Duration;

use metrics::{counter, histogram};

use super::{
    InternalEvent,
    prelude::{error_stage, error_type},
};

#[derive(Debug)]
pub struct PostgresDatabaseCreated<'a> {
    pub database: &'a str,
}

impl InternalEvent for PostgresDatabaseCreated<'_> {
    fn emit(self) {
        info!(message = "Created database.", database = %self.database);
        counter!("databases_created_total").increment(1);
    }
}

#[derive(Debug)]
pub struct PostgresTableProvisioned<'a> {
    pub table: &'a str,
    pub created: bool,
}

impl InternalEvent for PostgresTableProvisioned<'_> {
    fn emit(self) {
        if self.created {
            info!(message = "Created table.", table = %self.table);
            counter!("tables_created_total").increment(1);
        } else {
            debug!(message = "Table already exists.", table = %self.table);
        }
    }

    fn name(&self) -> Option<&'static str> {
        Some("PostgresTableProvisioned")
    }
}

#[derive(Debug)]
pub struct PostgresPoolSizeRaised {
    pub configured: u32,
    pub required: u32,
}

impl InternalEvent for PostgresPoolSizeRaised {
    fn emit(self) {
        info!(
            message = "Raised connection pool size to the number of concurrent pipelines.",
            configured = self.configured,
            required = self.required,
        );
    }
}

#[derive(Debug)]
pub struct PostgresSamplesInserted<'a> {
    pub table: &'a str,
    pub count: usize,
    pub batches: usize,
    pub elapsed: Duration,
}

impl InternalEvent for PostgresSamplesInserted<'_> {
    fn emit(self) {
        debug!(
            message = "Inserted samples.",
            table = %self.table,
            count = self.count,
            batches = self.batches,
            elapsed_ms = self.elapsed.as_millis() as u64,
        );
        counter!("samples_inserted_total").increment(self.count as u64);
        counter!("insert_batches_total").increment(self.batches as u64);
        histogram!("insert_duration_seconds").record(self.elapsed);
    }

    fn name(&self) -> Option<&'static str> {
        Some("PostgresSamplesInserted")
    }
}

#[derive(Debug)]
pub struct PostgresBatchInsertError<'a, E> {
    pub table: &'a str,
    pub batch: usize,
    pub rows: usize,
    pub error: &'a E,
}

impl<E: std::fmt::Display> InternalEvent for PostgresBatchInsertError<'_, E> {
    fn emit(self) {
        error!(
            message = "Batch insert failed.",
            table = %self.table,
            batch = self.batch,
            rows = self.rows,
            error = %self.error,
            error_type = error_type::WRITER_FAILED,
            stage = error_stage::SENDING,
        );
        counter!(
            "component_errors_total",
            "error_type" => error_type::WRITER_FAILED,
            "stage" => error_stage::SENDING,
        )
        .increment(1);
        counter!("samples_discarded_total").increment(self.rows as u64);
    }

    fn name(&self) -> Option<&'static str> {
        Some("PostgresBatchInsertError")
    }
}
