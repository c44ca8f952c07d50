use std::{num::NonZeroUsize, sync::Arc};

use chrono::Utc;
use snafu::{ResultExt, Snafu};
use tokio::runtime::{self, Runtime};

use crate::{
    cli::{LogFormat, Opts, SubCommand, ValidateOpts, handle_config_errors},
    config::Config,
    ingest::{Orchestrator, RunReport},
    sinks::postgres::{PostgresError, PostgresStore},
    sources::{
        SourceClient,
        prometheus::{BuildError, PrometheusClient},
    },
    trace,
};

/// Failures reaching the source or the sink before any query runs.
#[derive(Debug, Snafu)]
enum ConnectionError {
    #[snafu(display("Failed to build Prometheus client: {}", source))]
    BuildSource { source: BuildError },
    #[snafu(display("Prometheus healthcheck failed: {}", source))]
    Healthcheck { source: crate::Error },
    #[snafu(display("Failed to prepare PostgreSQL: {}", source))]
    ConnectSink { source: PostgresError },
}

impl ConnectionError {
    const fn exit_code(&self) -> exitcode::ExitCode {
        match self {
            ConnectionError::BuildSource { .. } => exitcode::CONFIG,
            ConnectionError::Healthcheck { .. } | ConnectionError::ConnectSink { .. } => {
                exitcode::UNAVAILABLE
            }
        }
    }
}

pub struct Application {
    config: Config,
    sub_command: Option<SubCommand>,
    runtime: Runtime,
}

impl Application {
    pub fn prepare() -> Result<Self, exitcode::ExitCode> {
        let opts = Opts::get_matches().map_err(|error| {
            // Printing to stdout/err can itself fail; ignore it.
            _ = error.print();
            if error.use_stderr() {
                exitcode::USAGE
            } else {
                exitcode::OK
            }
        })?;

        Self::prepare_from_opts(opts)
    }

    pub fn prepare_from_opts(opts: Opts) -> Result<Self, exitcode::ExitCode> {
        #[allow(deprecated)]
        openssl_probe::init_ssl_cert_env_vars();

        let level = std::env::var("LOG").unwrap_or_else(|_| match opts.log_level() {
            "off" => "off".to_owned(),
            level => [
                format!("metering_ingest={level}"),
                format!("sqlx={}", sqlx_level(level)),
            ]
            .join(","),
        });

        let root_opts = opts.root;
        let json = match root_opts.log_format {
            LogFormat::Text => false,
            LogFormat::Json => true,
        };
        trace::init(root_opts.color.use_color(), json, &level);

        let mut config = Config::load(root_opts.config_path.as_ref()).map_err(handle_config_errors)?;
        root_opts.overrides.apply(&mut config);
        config.validate().map_err(handle_config_errors)?;

        let runtime = build_runtime(root_opts.threads)?;

        Ok(Application {
            config,
            sub_command: opts.sub_command,
            runtime,
        })
    }

    pub fn run(self) -> exitcode::ExitCode {
        let Application {
            config,
            sub_command,
            runtime,
        } = self;

        match sub_command {
            Some(SubCommand::Validate(opts)) => validate(&config, &opts),
            Some(SubCommand::Run) | None => match runtime.block_on(ingest(config)) {
                Ok(report) => report.exit_code(),
                Err(code) => code,
            },
        }
    }
}

// sqlx logs every statement at info.
fn sqlx_level(level: &str) -> &str {
    match level {
        "info" => "warn",
        level => level,
    }
}

fn build_runtime(threads: Option<usize>) -> Result<Runtime, exitcode::ExitCode> {
    let threads = match threads {
        Some(0) => {
            error!("The `threads` argument must be greater or equal to 1.");
            return Err(exitcode::CONFIG);
        }
        Some(threads) => threads,
        None => std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
    };

    runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(threads)
        .build()
        .map_err(|error| {
            error!(message = "Unable to create async runtime.", %error);
            exitcode::OSERR
        })
}

fn validate(config: &Config, opts: &ValidateOpts) -> exitcode::ExitCode {
    if opts.dump {
        match toml::to_string(config) {
            Ok(dump) => println!("{dump}"),
            Err(error) => {
                error!(message = "Failed to render configuration.", %error);
                return exitcode::SOFTWARE;
            }
        }
    }

    println!(
        "Configuration is valid: {} queries from {} into {}.",
        config.queries.len(),
        config.source.endpoint,
        config.sink.endpoint()
    );
    exitcode::OK
}

async fn connect(
    config: &Config,
    pipelines: usize,
) -> Result<(PrometheusClient, PostgresStore), ConnectionError> {
    let source = config.source.build().context(BuildSourceSnafu)?;

    if config.healthcheck {
        source.healthcheck().await.context(HealthcheckSnafu)?;
        info!(message = "Healthcheck passed.", endpoint = %config.source.endpoint);
    } else {
        info!("Healthcheck disabled.");
    }

    let store = PostgresStore::connect(&config.sink, pipelines)
        .await
        .context(ConnectSinkSnafu)?;

    Ok((source, store))
}

async fn ingest(config: Config) -> Result<RunReport, exitcode::ExitCode> {
    let range = config.range.to_time_range(Utc::now()).map_err(|error| {
        error!(message = "Invalid query range.", %error);
        exitcode::CONFIG
    })?;

    let queries = config.query_specs();
    let (source, store) = connect(&config, queries.len()).await.map_err(|error| {
        error!(message = "Startup failed.", %error);
        error.exit_code()
    })?;

    info!(
        message = "Starting ingestion run.",
        queries = queries.len(),
        start = %range.start(),
        end = %range.end(),
        step = ?range.step(),
    );

    let report = Orchestrator::new(Arc::new(source), Arc::new(store), queries, range)
        .with_run_timeout(config.run_timeout())
        .run()
        .await;

    for outcome in &report.outcomes {
        if outcome.is_success() {
            info!("{outcome}");
        } else {
            error!("{outcome}");
        }
    }

    Ok(report)
}
