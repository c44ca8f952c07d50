#![allow(missing_docs)]
use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::{
    config::Config,
    get_version,
    http::Auth,
    sinks::postgres::SslMode,
    tls::TlsOptions,
};

#[derive(Parser, Debug)]
#[command(rename_all = "kebab-case", version = get_version())]
pub struct Opts {
    #[command(flatten)]
    pub root: RootOpts,

    #[command(subcommand)]
    pub sub_command: Option<SubCommand>,
}

impl Opts {
    pub fn get_matches() -> Result<Self, clap::Error> {
        Opts::try_parse()
    }

    pub const fn log_level(&self) -> &'static str {
        let (quiet_level, verbose_level) = match self.sub_command {
            Some(SubCommand::Validate(_)) => {
                if self.root.verbose == 0 {
                    (self.root.quiet + 1, self.root.verbose)
                } else {
                    (self.root.quiet, self.root.verbose - 1)
                }
            }
            _ => (self.root.quiet, self.root.verbose),
        };
        match quiet_level {
            0 => match verbose_level {
                0 => "info",
                1 => "debug",
                2..=255 => "trace",
            },
            1 => "warn",
            2 => "error",
            3..=255 => "off",
        }
    }
}

#[derive(Parser, Debug, Default)]
#[command(rename_all = "kebab-case")]
pub struct RootOpts {
    /// Read configuration from a TOML file. Command line flags override its values.
    #[arg(id = "config", short, long, env = "METERING_INGEST_CONFIG", global = true)]
    pub config_path: Option<PathBuf>,

    /// Number of threads to use for processing (default is number of available cores)
    #[arg(short, long, env = "METERING_INGEST_THREADS", global = true)]
    pub threads: Option<usize>,

    /// Enable more detailed internal logging. Repeat to increase level. Overridden by `--quiet`.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Reduce detail of internal logging. Repeat to reduce further. Overrides `--verbose`.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Set the logging format
    #[arg(long, default_value = "text", env = "METERING_INGEST_LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    /// Control when ANSI terminal formatting is used.
    ///
    /// By default it is used only when stdout is a terminal.
    #[arg(long, default_value = "auto", env = "METERING_INGEST_COLOR", global = true)]
    pub color: Color,

    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

/// Flags taking precedence over the configuration file.
#[derive(Parser, Debug, Default)]
#[command(rename_all = "kebab-case")]
pub struct ConfigOverrides {
    /// Base URL of the Prometheus or Thanos querier API
    #[arg(long, env = "PROMETHEUS_ADDRESS", global = true)]
    pub prometheus_address: Option<String>,

    /// Bearer token sent to Prometheus. Takes precedence over the token path.
    #[arg(long, env = "PROMETHEUS_BEARER_TOKEN", hide_env_values = true, global = true)]
    pub prometheus_bearer_token: Option<String>,

    /// File holding the bearer token sent to Prometheus
    #[arg(long, env = "PROMETHEUS_BEARER_TOKEN_PATH", global = true)]
    pub prometheus_bearer_token_path: Option<PathBuf>,

    /// Skip verification of the certificate presented by Prometheus
    #[arg(long, global = true)]
    pub prometheus_tls_insecure: bool,

    /// Bound on every Prometheus request, in seconds
    #[arg(long, global = true)]
    pub prometheus_timeout_secs: Option<u64>,

    /// Hostname of the PostgreSQL server
    #[arg(long, env = "POSTGRES_ADDRESS", global = true)]
    pub postgres_address: Option<String>,

    #[arg(long, env = "POSTGRES_PORT", global = true)]
    pub postgres_port: Option<u16>,

    #[arg(long, env = "POSTGRES_SSL_MODE", global = true)]
    pub postgres_ssl_mode: Option<SslMode>,

    /// Database holding one table per query
    #[arg(long, env = "POSTGRES_DATABASE_NAME", global = true)]
    pub postgres_database_name: Option<String>,

    #[arg(long, env = "POSTGRES_USER", global = true)]
    pub postgres_user: Option<String>,

    #[arg(long, env = "POSTGRES_PASSWORD", hide_env_values = true, global = true)]
    pub postgres_password: Option<String>,

    /// Rows written per insert statement
    #[arg(long, global = true)]
    pub max_batch_size: Option<usize>,

    /// Queries to import, replacing the configured ones. Repeat or separate with commas.
    #[arg(long = "query", value_delimiter(','), global = true)]
    pub queries: Vec<String>,

    /// Deadline for the whole run, in seconds
    #[arg(long, global = true)]
    pub run_timeout_secs: Option<u64>,

    /// Do not check that Prometheus is reachable before starting
    #[arg(long, global = true)]
    pub no_healthcheck: bool,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut Config) {
        let source = &mut config.source;
        if let Some(endpoint) = &self.prometheus_address {
            source.endpoint.clone_from(endpoint);
        }
        if let Some(token) = &self.prometheus_bearer_token {
            source.auth = Some(Auth::Bearer {
                token: token.clone(),
            });
        }
        if let Some(path) = &self.prometheus_bearer_token_path {
            source.token_file = Some(path.clone());
        }
        if self.prometheus_tls_insecure {
            source.tls = Some(TlsOptions {
                ca_file: source.tls.as_ref().and_then(|tls| tls.ca_file.clone()),
                ..TlsOptions::insecure()
            });
        }
        if let Some(timeout_secs) = self.prometheus_timeout_secs {
            source.timeout_secs = timeout_secs;
        }

        let sink = &mut config.sink;
        if let Some(host) = &self.postgres_address {
            sink.host.clone_from(host);
        }
        if let Some(port) = self.postgres_port {
            sink.port = port;
        }
        if let Some(ssl_mode) = self.postgres_ssl_mode {
            sink.ssl_mode = ssl_mode;
        }
        if let Some(database) = &self.postgres_database_name {
            sink.database.clone_from(database);
        }
        if let Some(user) = &self.postgres_user {
            sink.user.clone_from(user);
        }
        if let Some(password) = &self.postgres_password {
            sink.password.clone_from(password);
        }
        if let Some(max_batch_size) = self.max_batch_size {
            sink.max_batch_size = max_batch_size;
        }

        if !self.queries.is_empty() {
            config.queries.clone_from(&self.queries);
        }
        if let Some(run_timeout_secs) = self.run_timeout_secs {
            config.run_timeout_secs = Some(run_timeout_secs);
        }
        if self.no_healthcheck {
            config.healthcheck = false;
        }
    }
}

#[derive(clap::Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
pub enum SubCommand {
    /// Import the last range of every query. The default when no subcommand is given.
    Run,

    /// Validate the configuration and exit.
    Validate(ValidateOpts),
}

#[derive(Parser, Debug)]
#[command(rename_all = "kebab-case")]
pub struct ValidateOpts {
    /// Print the effective configuration as TOML.
    #[arg(long)]
    pub dump: bool,
}

#[derive(clap::ValueEnum, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    #[default]
    Auto,
    Always,
    Never,
}

impl Color {
    pub fn use_color(&self) -> bool {
        match self {
            #[cfg(unix)]
            Color::Auto => {
                use std::io::IsTerminal;
                std::io::stdout().is_terminal()
            }
            #[cfg(windows)]
            Color::Auto => false, // ANSI colors are not supported by cmd.exe
            Color::Always => true,
            Color::Never => false,
        }
    }
}

#[derive(clap::ValueEnum, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

pub fn handle_config_errors(errors: Vec<String>) -> exitcode::ExitCode {
    for error in errors {
        error!(message = "Configuration error.", %error);
    }

    exitcode::CONFIG
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use similar_asserts::assert_eq;

    use super::*;

    fn parse(args: &[&str]) -> Opts {
        Opts::try_parse_from(std::iter::once("metering-ingest").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn verify_cli() {
        Opts::command().debug_assert();
    }

    #[test]
    fn log_levels() {
        assert_eq!(parse(&[]).log_level(), "info");
        assert_eq!(parse(&["-vv"]).log_level(), "trace");
        assert_eq!(parse(&["-q"]).log_level(), "warn");
        assert_eq!(parse(&["validate"]).log_level(), "warn");
        assert_eq!(parse(&["validate", "-v"]).log_level(), "info");
        assert_eq!(parse(&["-qqq"]).log_level(), "off");
    }

    #[test]
    fn overrides_replace_file_values() {
        let opts = parse(&[
            "run",
            "--prometheus-address",
            "http://prometheus:9090",
            "--prometheus-bearer-token",
            "abc",
            "--prometheus-tls-insecure",
            "--postgres-address",
            "db",
            "--postgres-port",
            "6543",
            "--postgres-ssl-mode",
            "require",
            "--query",
            "a:b,c:d",
            "--query",
            "e",
            "--no-healthcheck",
        ]);
        assert!(matches!(opts.sub_command, Some(SubCommand::Run)));

        let mut config = Config::default();
        opts.root.overrides.apply(&mut config);

        assert_eq!(config.source.endpoint, "http://prometheus:9090");
        assert_eq!(
            config.source.auth,
            Some(Auth::Bearer {
                token: "abc".into()
            })
        );
        assert_eq!(config.source.tls, Some(TlsOptions::insecure()));
        assert_eq!(config.sink.host, "db");
        assert_eq!(config.sink.port, 6543);
        assert_eq!(config.sink.ssl_mode, SslMode::Require);
        assert_eq!(config.queries, vec!["a:b", "c:d", "e"]);
        assert!(!config.healthcheck);
    }

    #[test]
    fn no_overrides_keep_config() {
        let mut config = Config::default();
        ConfigOverrides::default().apply(&mut config);
        assert_eq!(config, Config::default());
    }
}
