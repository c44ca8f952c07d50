#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![allow(clippy::module_name_repetitions)]

//! The main library to support building `metering-ingest`.
//!
//! A run reads a fixed list of Prometheus recording rules, provisions one
//! PostgreSQL table per rule, then fetches, transforms and inserts the
//! results of every rule concurrently. See [`ingest::Orchestrator`].

#[macro_use]
extern crate tracing;

#[macro_use]
pub mod internal_events;

pub mod app;
pub mod cli;
pub mod config;
pub mod event;
pub mod http;
pub mod ingest;
pub mod sinks;
pub mod sources;
#[cfg(test)]
pub mod test_util;
pub mod tls;
pub mod trace;
pub mod transforms;

pub use indoc::indoc;

/// Boxed error type used by the bootstrap layers.
pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

/// The name used to identify this tool in user agents and logs.
pub const fn get_app_name() -> &'static str {
    "metering-ingest"
}

/// Returns a string containing full version information of the current build.
pub fn get_version() -> String {
    let pkg_version = env!("CARGO_PKG_VERSION");
    let build_desc = option_env!("METERING_INGEST_BUILD_DESC");

    match build_desc {
        Some(desc) => format!("{pkg_version} ({desc})"),
        None => pkg_version.to_owned(),
    }
}
