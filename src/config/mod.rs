//! Run configuration.
//!
//! A [`Config`] is built once at startup from an optional TOML file and the
//! command line, validated, and then handed by reference to every component
//! constructor. Nothing reads configuration after that point.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    event::{RangeError, TimeRange},
    sinks::postgres::PostgresConfig,
    sources::prometheus::PrometheusConfig,
};

mod query;

pub use query::{MAX_TABLE_NAME_LEN, QuerySpec, table_name_for};

/// The recording rules shipped with the metering stack.
pub const DEFAULT_QUERIES: [&str; 15] = [
    "metering:node_allocatable_cpu_cores",
    "metering:node_allocatable_memory_bytes",
    "metering:node_capacity_cpu_cores",
    "metering:node_capacity_memory_bytes",
    "metering:persistentvolumeclaim_capacity_bytes",
    "metering:persistentvolumeclaim_phase",
    "metering:persistentvolumeclaim_request_bytes",
    "metering:persistentvolumeclaim_usage_bytes",
    "metering:pod_limit_cpu_cores",
    "metering:pod_limit_memory_bytes",
    "metering:pod_persistentvolumeclaim_request_info",
    "metering:pod_request_cpu_cores",
    "metering:pod_request_memory_bytes",
    "metering:pod_usage_cpu_cores",
    "metering:pod_usage_memory_bytes",
];

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub source: PrometheusConfig,

    #[serde(default)]
    pub sink: PostgresConfig,

    /// The queries to import. Each one gets its own table.
    #[serde(default = "default_queries")]
    pub queries: Vec<String>,

    #[serde(default)]
    pub range: RangeConfig,

    /// Deadline for the whole run. Pipelines still in flight when it expires
    /// are reported as failed.
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,

    /// Check that the source answers before starting.
    #[serde(default = "default_healthcheck")]
    pub healthcheck: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: PrometheusConfig::default(),
            sink: PostgresConfig::default(),
            queries: default_queries(),
            range: RangeConfig::default(),
            run_timeout_secs: None,
            healthcheck: default_healthcheck(),
        }
    }
}

fn default_queries() -> Vec<String> {
    DEFAULT_QUERIES.iter().map(|query| (*query).to_owned()).collect()
}

const fn default_healthcheck() -> bool {
    true
}

/// The window every query is evaluated over.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RangeConfig {
    #[serde(default = "default_lookback_secs")]
    pub lookback_secs: u64,

    #[serde(default = "default_step_secs")]
    pub step_secs: u64,

    /// Fixed end of the window. Defaults to the start of the run.
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            lookback_secs: default_lookback_secs(),
            step_secs: default_step_secs(),
            end: None,
        }
    }
}

const fn default_lookback_secs() -> u64 {
    TimeRange::DEFAULT_LOOKBACK.as_secs()
}

const fn default_step_secs() -> u64 {
    TimeRange::DEFAULT_STEP.as_secs()
}

impl RangeConfig {
    pub fn to_time_range(&self, now: DateTime<Utc>) -> Result<TimeRange, RangeError> {
        TimeRange::ending_at(
            self.end.unwrap_or(now),
            Duration::from_secs(self.lookback_secs),
            Duration::from_secs(self.step_secs),
        )
    }
}

impl Config {
    pub fn load_from_path(path: &Path) -> Result<Self, Vec<String>> {
        let contents = fs::read_to_string(path)
            .map_err(|error| vec![format!("Could not read config file {path:?}: {error}.")])?;
        Self::load_from_str(&contents)
    }

    pub fn load_from_str(contents: &str) -> Result<Self, Vec<String>> {
        toml::from_str(contents).map_err(|error| vec![error.to_string()])
    }

    /// Loads the file at `path` if given, otherwise the defaults.
    pub fn load(path: Option<&PathBuf>) -> Result<Self, Vec<String>> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Ok(Self::default()),
        }
    }

    pub fn query_specs(&self) -> Vec<QuerySpec> {
        self.queries.iter().map(QuerySpec::new).collect()
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.queries.is_empty() {
            errors.push("No queries defined in the config.".to_owned());
        }

        let mut tables: HashMap<String, &str> = HashMap::new();
        for query in &self.queries {
            if query.trim().is_empty() {
                errors.push("Queries must not be empty.".to_owned());
                continue;
            }
            let table = table_name_for(query);
            if table.len() > MAX_TABLE_NAME_LEN {
                errors.push(format!(
                    "Query \"{query}\" maps to table \"{table}\", longer than {MAX_TABLE_NAME_LEN} bytes."
                ));
                continue;
            }
            match tables.insert(table, query) {
                Some(previous) if previous == query.as_str() => {
                    errors.push(format!("Query \"{query}\" is defined more than once."));
                }
                Some(previous) => errors.push(format!(
                    "Queries \"{previous}\" and \"{query}\" map to the same table \"{}\".",
                    table_name_for(query)
                )),
                None => {}
            }
        }

        if self.range.step_secs == 0 {
            errors.push("`range.step_secs` must be greater than zero.".to_owned());
        }
        if self.run_timeout_secs == Some(0) {
            errors.push("`run_timeout_secs` must be greater than zero.".to_owned());
        }

        errors.extend(self.source.validate());
        errors.extend(self.sink.validate());

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use indoc::indoc;
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.queries.len(), 15);
        assert_eq!(config.sink.max_batch_size, 50);
        assert!(config.healthcheck);
    }

    #[test]
    fn empty_file_yields_defaults() {
        assert_eq!(Config::load_from_str("").unwrap(), Config::default());
    }

    #[test]
    fn parses_full_file() {
        let config = Config::load_from_str(indoc! {r#"
            queries = ["metering:pod_usage_cpu_cores", "up"]
            run_timeout_secs = 30
            healthcheck = false

            [source]
            endpoint = "http://localhost:9090"
            timeout_secs = 5

            [source.auth]
            strategy = "bearer"
            token = "abc"

            [sink]
            host = "db"
            port = 5433
            database = "metrics"
            max_batch_size = 100

            [range]
            lookback_secs = 600
            step_secs = 30
            end = "2024-01-01T00:10:00Z"
        "#})
        .unwrap();

        config.validate().unwrap();
        assert_eq!(
            config.query_specs(),
            vec![
                QuerySpec::new("metering:pod_usage_cpu_cores"),
                QuerySpec::new("up")
            ]
        );
        assert_eq!(config.run_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.sink.host, "db");
        assert_eq!(config.sink.port, 5433);
        assert_eq!(config.sink.max_batch_size, 100);

        let range = config.range.to_time_range(Utc::now()).unwrap();
        assert_eq!(range.end(), Utc.with_ymd_and_hms(2024, 1, 1, 0, 10, 0).unwrap());
        assert_eq!(range.start(), Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(range.step(), Duration::from_secs(30));
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(Config::load_from_str("querys = []").is_err());
    }

    #[test]
    fn rejects_colliding_tables() {
        let config = Config {
            queries: vec!["a:b".into(), "a_b".into(), "a:b".into()],
            ..Default::default()
        };

        let errors = config.validate().unwrap_err();
        assert_eq!(
            errors,
            vec![
                "Queries \"a:b\" and \"a_b\" map to the same table \"a_b\".".to_owned(),
                "Queries \"a_b\" and \"a:b\" map to the same table \"a_b\".".to_owned(),
            ]
        );
    }

    #[test]
    fn rejects_overlong_table_names() {
        let long = format!("metering:{}", "x".repeat(60));
        let config = Config {
            queries: vec![long.clone(), format!("{long}_other"), "a".repeat(63)],
            ..Default::default()
        };

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2, "{errors:?}");
        assert_eq!(
            errors[0],
            format!(
                "Query \"{long}\" maps to table \"{}\", longer than 63 bytes.",
                table_name_for(&long)
            )
        );
    }

    #[test]
    fn rejects_duplicate_query() {
        let config = Config {
            queries: vec!["up".into(), "up".into()],
            ..Default::default()
        };

        assert_eq!(
            config.validate().unwrap_err(),
            vec!["Query \"up\" is defined more than once.".to_owned()]
        );
    }

    #[test]
    fn rejects_empty_queries_and_zero_step() {
        let config = Config {
            queries: vec![],
            range: RangeConfig {
                step_secs: 0,
                ..Default::default()
            },
            ..Default::default()
        };

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
