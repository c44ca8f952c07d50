//! PostgreSQL storage. Every query gets a table of
//! `(value float8, "timestamp" timestamptz, "stepSize" float8, labels jsonb)`.

mod config;
mod store;


pub use config::{MAINTENANCE_DATABASE, PostgresConfig, SslMode};
pub use store::{PostgresError, PostgresStore, quote_identifier};
