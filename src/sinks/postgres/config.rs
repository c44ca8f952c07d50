use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::sinks::DEFAULT_MAX_BATCH_SIZE;

/// Database used to create the target database when it is missing.
pub const MAINTENANCE_DATABASE: &str = "postgres";

/// How to negotiate TLS with the server.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    #[default]
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl From<SslMode> for PgSslMode {
    fn from(mode: SslMode) -> Self {
        match mode {
            SslMode::Disable => PgSslMode::Disable,
            SslMode::Allow => PgSslMode::Allow,
            SslMode::Prefer => PgSslMode::Prefer,
            SslMode::Require => PgSslMode::Require,
            SslMode::VerifyCa => PgSslMode::VerifyCa,
            SslMode::VerifyFull => PgSslMode::VerifyFull,
        }
    }
}

/// Where and how samples are stored.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PostgresConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// The database holding one table per query.
    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_password")]
    pub password: String,

    #[serde(default)]
    pub ssl_mode: SslMode,

    /// Rows written per insert statement.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Connections kept by the pool. Raised to the number of queries when
    /// lower, so every pipeline can hold a connection at once.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Bound on every statement and on acquiring a connection.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Create `database` through the maintenance database when it is missing.
    #[serde(default = "default_create_database")]
    pub create_database: bool,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: default_database(),
            user: default_user(),
            password: default_password(),
            ssl_mode: SslMode::default(),
            max_batch_size: default_max_batch_size(),
            pool_size: default_pool_size(),
            timeout_secs: default_timeout_secs(),
            create_database: default_create_database(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_owned()
}

const fn default_port() -> u16 {
    5432
}

fn default_database() -> String {
    "metering".to_owned()
}

fn default_user() -> String {
    "testuser".to_owned()
}

fn default_password() -> String {
    "testpass".to_owned()
}

const fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

const fn default_pool_size() -> u32 {
    10
}

const fn default_timeout_secs() -> u64 {
    10
}

const fn default_create_database() -> bool {
    true
}

impl PostgresConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push("`sink.host` must not be empty.".to_owned());
        }
        if self.database.is_empty() {
            errors.push("`sink.database` must not be empty.".to_owned());
        }
        if self.user.is_empty() {
            errors.push("`sink.user` must not be empty.".to_owned());
        }
        if self.max_batch_size == 0 {
            errors.push("`sink.max_batch_size` must be greater than zero.".to_owned());
        }
        if self.pool_size == 0 {
            errors.push("`sink.pool_size` must be greater than zero.".to_owned());
        }
        if self.timeout_secs == 0 {
            errors.push("`sink.timeout_secs` must be greater than zero.".to_owned());
        }

        errors
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Connection options for `database`.
    pub fn connect_options(&self, database: &str) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(database)
            .ssl_mode(self.ssl_mode.into())
            .application_name(crate::get_app_name())
    }

    /// Pool size needed to run `pipelines` pipelines at once.
    pub fn pool_size_for(&self, pipelines: usize) -> u32 {
        let pipelines = u32::try_from(pipelines).unwrap_or(u32::MAX);
        self.pool_size.max(pipelines)
    }

    /// `host:port/database`, for logs.
    pub fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_local_setup() {
        let config = PostgresConfig::default();
        assert_eq!(config.endpoint(), "localhost:5432/metering");
        assert_eq!(config.ssl_mode, SslMode::Disable);
        assert_eq!(config.max_batch_size, 50);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn pool_grows_with_pipelines() {
        let config = PostgresConfig {
            pool_size: 5,
            ..Default::default()
        };
        assert_eq!(config.pool_size_for(2), 5);
        assert_eq!(config.pool_size_for(15), 15);
    }

    #[test]
    fn parses_ssl_mode() {
        let config: PostgresConfig = toml::from_str("ssl_mode = \"verify-full\"").unwrap();
        assert_eq!(config.ssl_mode, SslMode::VerifyFull);
        assert!(toml::from_str::<PostgresConfig>("ssl_mode = \"sometimes\"").is_err());
    }

    #[test]
    fn rejects_zero_limits() {
        let config = PostgresConfig {
            max_batch_size: 0,
            pool_size: 0,
            timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.validate().len(), 3);
    }
}
