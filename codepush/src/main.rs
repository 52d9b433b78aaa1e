mod config;

use clap::{Parser, Subcommand};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use shared::metrics_defs::{MetricDef, MetricType};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;
use update_server::errors::UpdateServerError;

const METRICS_PREFIX: &str = "codepush";

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the YAML config file
    #[arg(long)]
    config_file: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve update checks and status reports
    UpdateServer,
    /// Load and validate the config file, then exit
    CheckConfig,
}

#[derive(thiserror::Error, Debug)]
enum MainError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    UpdateServer(#[from] UpdateServerError),
}

fn main() -> Result<(), MainError> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config_file)?;

    // Flushes pending events on drop
    let _sentry = init_logging(config.common.logging.as_ref());

    if let Some(metrics) = &config.common.metrics {
        init_metrics(metrics)?;
    }

    match cli.command {
        CliCommand::UpdateServer => {
            tracing::info!("Starting update server");
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(update_server::run(config.update_server))?;
        }
        CliCommand::CheckConfig => {
            tracing::info!(path = %cli.config_file.display(), "Config is valid");
        }
    }

    Ok(())
}

fn init_logging(logging: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let guard = logging.map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    let sentry_layer = guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_layer)
        .init();

    guard
}

fn init_metrics(config: &MetricsConfig) -> Result<(), MainError> {
    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(Some(METRICS_PREFIX))
        .map_err(|e| MainError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| MainError::Metrics(e.to_string()))?;

    update_server::ALL_METRICS.iter().for_each(describe_metric);
    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "Reporting metrics to statsd"
    );
    Ok(())
}

fn describe_metric(def: &MetricDef) {
    match def.metric_type {
        MetricType::Counter => metrics::describe_counter!(def.name, def.description),
        MetricType::Histogram => metrics::describe_histogram!(def.name, def.description),
    }
}
