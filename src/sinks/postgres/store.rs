use std::{future::Future, time::Duration};

use async_trait::async_trait;
use snafu::{ResultExt, Snafu};
use sqlx::{
    Connection, PgConnection, PgPool, Postgres, QueryBuilder,
    postgres::PgPoolOptions,
    types::Json,
};
use tokio::time::Instant;

use super::config::{MAINTENANCE_DATABASE, PostgresConfig};
use crate::{
    event::MetricSample,
    internal_events::{
        PostgresDatabaseCreated, PostgresPoolSizeRaised, PostgresSamplesInserted,
        PostgresTableProvisioned,
    },
    sinks::{InsertProgress, SinkStore, StoreError, batch_count, insert_in_batches},
};

const TABLE_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
    WHERE table_schema = current_schema() AND table_name = $1)";

const DATABASE_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)";

// SQLSTATEs raised when a concurrent creator won the race.
const DUPLICATE_TABLE: &str = "42P07";
const DUPLICATE_DATABASE: &str = "42P04";
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Snafu)]
pub enum PostgresError {
    #[snafu(display("Failed to connect to {}: {}", endpoint, source))]
    Connect {
        endpoint: String,
        source: sqlx::Error,
    },
    #[snafu(display("Statement failed: {}", source))]
    Statement { source: sqlx::Error },
    #[snafu(display("Statement timed out after {:?}", timeout))]
    TimedOut { timeout: Duration },
}

impl PostgresError {
    fn has_code(&self, codes: &[&str]) -> bool {
        match self {
            PostgresError::Statement { source } => source
                .as_database_error()
                .and_then(|error| error.code())
                .is_some_and(|code| codes.contains(&code.as_ref())),
            _ => false,
        }
    }
}

async fn bounded<T>(
    timeout: Duration,
    statement: impl Future<Output = Result<T, sqlx::Error>>,
) -> Result<T, PostgresError> {
    tokio::time::timeout(timeout, statement)
        .await
        .map_err(|_| PostgresError::TimedOut { timeout })?
        .context(StatementSnafu)
}

/// Quotes `name` so it is used verbatim as an identifier.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn create_table_statement(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (value float8, \"timestamp\" timestamptz, \"stepSize\" float8, labels jsonb)",
        quote_identifier(table)
    )
}

fn insert_statement(table: &str) -> String {
    format!(
        "INSERT INTO {} (value, \"timestamp\", \"stepSize\", labels) ",
        quote_identifier(table)
    )
}

/// A [`SinkStore`] writing into PostgreSQL through a shared connection pool.
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
    max_batch_size: usize,
    timeout: Duration,
}

impl PostgresStore {
    /// Connects a pool large enough for `pipelines` concurrent pipelines,
    /// creating the database first when configured to.
    pub async fn connect(config: &PostgresConfig, pipelines: usize) -> Result<Self, PostgresError> {
        if config.create_database {
            ensure_database(config).await?;
        }

        let max_connections = config.pool_size_for(pipelines);
        if max_connections > config.pool_size {
            emit!(PostgresPoolSizeRaised {
                configured: config.pool_size,
                required: max_connections,
            });
        }

        let timeout = config.timeout();
        let pool = tokio::time::timeout(
            timeout,
            PgPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(timeout)
                .connect_with(config.connect_options(&config.database)),
        )
        .await
        .map_err(|_| PostgresError::TimedOut { timeout })?
        .with_context(|_| ConnectSnafu {
            endpoint: config.endpoint(),
        })?;

        Ok(Self::from_pool(pool, config.max_batch_size, timeout))
    }

    pub fn from_pool(pool: PgPool, max_batch_size: usize, timeout: Duration) -> Self {
        Self {
            pool,
            max_batch_size,
            timeout,
        }
    }

    /// Returns whether the table had to be created.
    async fn provision(&self, table: &str) -> Result<bool, PostgresError> {
        let exists: bool = bounded(
            self.timeout,
            sqlx::query_scalar(TABLE_EXISTS).bind(table).fetch_one(&self.pool),
        )
        .await?;
        if exists {
            return Ok(false);
        }

        let statement = create_table_statement(table);
        match bounded(self.timeout, sqlx::query(&statement).execute(&self.pool)).await {
            Ok(_) => Ok(true),
            // Lost a creation race against another caller.
            Err(error) if error.has_code(&[DUPLICATE_TABLE, UNIQUE_VIOLATION]) => Ok(false),
            Err(error) => Err(error),
        }
    }
}

#[async_trait]
impl SinkStore for PostgresStore {
    async fn ensure_table(&self, table: &str) -> Result<(), StoreError> {
        let created = self
            .provision(table)
            .await
            .map_err(|error| StoreError::Provision {
                table: table.to_owned(),
                source: Box::new(error),
            })?;
        emit!(PostgresTableProvisioned { table, created });
        Ok(())
    }

    async fn batch_insert(
        &self,
        table: &str,
        samples: &[MetricSample],
        progress: &InsertProgress,
    ) -> Result<usize, StoreError> {
        let start = Instant::now();
        let statement = insert_statement(table);
        let pool = &self.pool;
        let timeout = self.timeout;

        let inserted = insert_in_batches(table, samples, self.max_batch_size, progress, |_, chunk| {
            let mut builder = QueryBuilder::<Postgres>::new(&statement);
            builder.push_values(chunk, |mut row, sample| {
                row.push_bind(sample.value)
                    .push_bind(sample.timestamp)
                    .push_bind(sample.step_size_nanos())
                    .push_bind(Json(sample.labels.clone()));
            });

            async move {
                let result = bounded(timeout, builder.build().execute(pool)).await?;
                Ok::<_, crate::Error>(result.rows_affected())
            }
        })
        .await?;

        emit!(PostgresSamplesInserted {
            table,
            count: inserted,
            batches: batch_count(samples.len(), self.max_batch_size.max(1)),
            elapsed: start.elapsed(),
        });
        Ok(inserted)
    }
}

async fn ensure_database(config: &PostgresConfig) -> Result<(), PostgresError> {
    let timeout = config.timeout();
    let mut connection = tokio::time::timeout(
        timeout,
        PgConnection::connect_with(&config.connect_options(MAINTENANCE_DATABASE)),
    )
    .await
    .map_err(|_| PostgresError::TimedOut { timeout })?
    .with_context(|_| ConnectSnafu {
        endpoint: format!("{}:{}/{}", config.host, config.port, MAINTENANCE_DATABASE),
    })?;

    let exists: bool = bounded(
        timeout,
        sqlx::query_scalar(DATABASE_EXISTS)
            .bind(&config.database)
            .fetch_one(&mut connection),
    )
    .await?;

    if !exists {
        let statement = format!("CREATE DATABASE {}", quote_identifier(&config.database));
        match bounded(timeout, sqlx::query(&statement).execute(&mut connection)).await {
            Ok(_) => emit!(PostgresDatabaseCreated {
                database: &config.database
            }),
            Err(error) if error.has_code(&[DUPLICATE_DATABASE, UNIQUE_VIOLATION]) => {}
            Err(error) => return Err(error),
        }
    }

    if let Err(error) = connection.close().await {
        debug!(message = "Failed to close maintenance connection.", %error);
    }
    Ok(())
}
