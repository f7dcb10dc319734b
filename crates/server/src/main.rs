//! Macen - Main entry point

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use macen::Service;
use macen_config::{Config, ParsedConfig};

const DEFAULT_CONFIG: &str = "/etc/macen.ini";

/// Macen - obtains and renews ACME certificates
#[derive(Parser, Debug)]
#[command(name = "macen")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(env = "MACEN_CONFIG", default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Test configuration and exit
    #[arg(short = 't', long = "test")]
    test: bool,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose")]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let parsed = load_config(&cli.config)?;

    if cli.test {
        return test_config(&cli.config, &parsed);
    }

    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    runtime.block_on(run(parsed.config))
}

fn load_config(path: &Path) -> Result<ParsedConfig> {
    info!(path = %path.display(), "Loading configuration");
    let parsed = Config::from_file(path)
        .with_context(|| format!("failed to load configuration {}", path.display()))?;

    for warning in &parsed.warnings {
        warn!("{warning}");
    }
    Ok(parsed)
}

/// Print a summary of the configuration and exit
fn test_config(path: &Path, parsed: &ParsedConfig) -> Result<()> {
    let config = &parsed.config;

    info!("Configuration test successful:");
    info!("  - {} verification(s), default {:?}", config.validators.len(), config.default_validator);
    info!("  - {} storage(s), default {:?}", config.storages.len(), config.default_storage);
    info!("  - {} management listener(s)", config.mgmt.listeners.len());

    println!(
        "macen: configuration file {} test is successful ({} warning(s))",
        path.display(),
        parsed.warnings.len()
    );
    Ok(())
}

async fn run(config: Config) -> Result<()> {
    let shutdown = CancellationToken::new();
    let service = Service::start(&config, shutdown.clone()).await?;

    tokio::spawn(wait_for_signal(shutdown));
    service.run_until_shutdown().await;

    info!("Shutdown complete");
    Ok(())
}

async fn wait_for_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                shutdown.cancel();
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received interrupt");
    }

    shutdown.cancel();
}
