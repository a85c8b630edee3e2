use std::collections::BTreeMap;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ops_remediation::{
    config::{Config, LogFormat},
    remediation::{DryRunExecutor, MetricsSnapshot, Prediction, RemediationEngine, RuleCatalog},
    server::{AppState, McpServer},
};

#[derive(Debug, Parser)]
#[command(name = "ops-remediation", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the MCP server on stdio together with the monitoring loop (default)
    Serve,
    /// Print the built-in rule catalog as JSON
    Rules,
    /// Evaluate one snapshot against the built-in rules in dry-run mode
    Evaluate {
        /// Metrics as a JSON object, e.g. '{"cpu_percent": 97}'
        #[arg(long)]
        metrics: String,
        /// Optional prediction as JSON with anomaly_score, confidence, is_anomaly
        #[arg(long)]
        prediction: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Rules => print_rules(),
        Command::Evaluate {
            metrics,
            prediction,
        } => evaluate(config, &metrics, prediction.as_deref()).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Ops remediation server starting..."
    );

    let autostart = config.monitor.autostart;
    let state = match AppState::from_config(config) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(error = %e, "Failed to initialize application state");
            return Err(e.into());
        }
    };

    if autostart {
        state.monitor.start().await;
    } else {
        info!("MONITOR_AUTOSTART=false, monitoring loop left stopped");
    }

    let server = McpServer::new(Arc::clone(&state));

    info!("Server ready, waiting for requests on stdin...");

    let result = server.run().await;

    state.monitor.stop().await;

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

fn print_rules() -> anyhow::Result<()> {
    let catalog = RuleCatalog::with_defaults();
    println!("{}", serde_json::to_string_pretty(catalog.list())?);
    Ok(())
}

async fn evaluate(config: Config, metrics: &str, prediction: Option<&str>) -> anyhow::Result<()> {
    let metrics: BTreeMap<String, f64> = serde_json::from_str(metrics)?;
    let prediction: Option<Prediction> = prediction.map(serde_json::from_str).transpose()?;

    let engine = RemediationEngine::new(config.engine, Arc::new(DryRunExecutor::new()));
    let results = engine
        .process(&MetricsSnapshot::new(metrics), prediction.as_ref())
        .await;

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    // stdout carries MCP traffic, so logs always go to stderr
    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
