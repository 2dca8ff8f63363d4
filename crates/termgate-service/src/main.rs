//! Terminal gateway service - Entry Point
//!
//! Serializes concurrent client requests against external trading
//! terminal sessions, detects position closures and reconciles them
//! against the history log into graded trade records.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

/// Terminal gateway service
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via TERMGATE_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    termgate_telemetry::init_logging()?;

    info!("Starting termgate v{}", env!("CARGO_PKG_VERSION"));

    // Determine config path: CLI arg > TERMGATE_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("TERMGATE_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");

    let config = if std::path::Path::new(&config_path).exists() {
        termgate_service::AppConfig::from_file(&config_path)?
    } else {
        tracing::warn!(path = %config_path, "Config file not found, using defaults");
        termgate_service::AppConfig::default()
    };
    info!(accounts = config.accounts.len(), "Configuration loaded");

    // The terminal adapter is injected here; without one the service runs
    // with a stub gate that fails every call as transient.
    let gate: termgate_gate::DynSessionGate = Arc::new(termgate_service::UnconfiguredGate);

    let mut app = termgate_service::Application::new(config, gate)?;

    app.run().await?;

    Ok(())
}
