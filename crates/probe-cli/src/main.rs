//! Token coverage probe - Entry Point
//!
//! Runs one bounded collection window against the configured feeds and exits
//! with 0 (pass), 1 (fail), 2 (inconclusive) or 3 (error).

use anyhow::Result;
use clap::Parser;
use probe_cli::{exit_code, render, AppConfig, Application, EXIT_ERROR};
use probe_compare::RunStatus;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

const DEFAULT_CONFIG: &str = "config/default.toml";

/// Cross-source coverage probe for the tracked token population
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "PROBE_CONFIG")]
    config: Option<String>,

    /// Override the window length in seconds
    #[arg(long)]
    window_secs: Option<u64>,

    /// Default log filter when RUST_LOG is unset (e.g. "debug")
    #[arg(long)]
    log_level: Option<String>,

    /// Override the pass threshold (percent)
    #[arg(long)]
    threshold: Option<Decimal>,

    /// Print the JSON report to stdout
    #[arg(long)]
    json: bool,

    /// Write the JSON report to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Write Prometheus metrics (text format) to this file after the run
    #[arg(long)]
    metrics_out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize TLS crypto provider (must be before any WS connections)
    probe_ws::init_crypto();

    let args = Args::parse();

    let filter = args
        .log_level
        .as_deref()
        .unwrap_or(probe_telemetry::DEFAULT_FILTER);
    if let Err(e) = probe_telemetry::init_logging_with(filter) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::from(EXIT_ERROR);
    }

    match run(args).await {
        Ok(status) => ExitCode::from(exit_code(status)),
        Err(e) => {
            error!(error = %e, "Probe run failed");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

async fn run(args: Args) -> Result<RunStatus> {
    info!("Starting coverage probe v{}", env!("CARGO_PKG_VERSION"));

    let config_path = args
        .config
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    info!(config_path = %config_path, "Loading configuration");

    let mut config = AppConfig::from_file(&config_path)?;
    if let Some(secs) = args.window_secs {
        config.window.secs = secs;
    }
    if let Some(threshold) = args.threshold {
        config.comparison.threshold_pct = threshold;
    }

    let app = Application::new(config)?;

    let interrupt = app.interrupt_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received");
            interrupt.cancel();
        }
    });

    let report = app.run().await?;
    render::log_summary(&report);

    if let Some(path) = &args.report {
        render::write_report(&report, path)?;
    }
    if args.json {
        println!("{}", render::to_json(&report)?);
    }
    if let Some(path) = &args.metrics_out {
        render::write_metrics(path)?;
    }

    Ok(report.status)
}
