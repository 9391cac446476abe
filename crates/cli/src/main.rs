mod cli;
mod commands;
mod metrics;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leggio_core::{load_config, validate_config, Config, StopFlag};

use cli::{Cli, Command};

/// Config file used when neither --config nor LEGGIO_CONFIG is set
const DEFAULT_CONFIG_FILE: &str = "leggio.toml";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Cli::parse();
    init_logging(args.json_logs);

    let config = resolve_config(args.config.clone())?;
    validate_config(&config).context("Configuration validation failed")?;

    let stop = StopFlag::new();
    tokio::spawn(stop_on_ctrl_c(stop.clone()));

    let result = match &args.command {
        Command::Convert(a) => commands::convert(&config, a, &stop).await,
        Command::Organize(a) => commands::organize(&config, a, &stop).await,
        Command::Pack(a) => commands::pack(&config, a, &stop).await,
        Command::Run(a) => commands::run_all(&config, a, &stop).await,
    };

    if let Some(ref path) = args.metrics_out {
        tokio::fs::write(path, metrics::encode_metrics())
            .await
            .with_context(|| format!("Failed to write metrics to {:?}", path))?;
    }

    result
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    // Logs go to stderr; stdout carries the JSON summary.
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Loads the config file, falling back to defaults when the implicit
/// default file does not exist.
fn resolve_config(explicit: Option<PathBuf>) -> Result<Config> {
    let (config_path, required) = match explicit {
        Some(path) => (path, true),
        None => match std::env::var("LEGGIO_CONFIG") {
            Ok(path) => (PathBuf::from(path), true),
            Err(_) => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        },
    };

    if !required && !config_path.exists() {
        info!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
        return Ok(Config::default());
    }

    info!("Loading configuration from {:?}", config_path);
    load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))
}

/// Requests a cooperative stop on the first Ctrl+C.
async fn stop_on_ctrl_c(stop: StopFlag) {
    if signal::ctrl_c().await.is_ok() {
        warn!("Stop requested, finishing in-flight work");
        stop.stop();
    }
}
