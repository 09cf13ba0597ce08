//! pv-fft - FFT engine service
//!
//! Runs the configured engine instances and feeds them binding events.
//!
//! # Usage
//!
//! ```bash
//! # Run the default instances (A1..A4), reading JSON events from stdin
//! producer | ./pv-fft run
//!
//! # Print the configured setup of one instance
//! ./pv-fft show A1
//!
//! # Validate a configuration file
//! ./pv-fft --config pvfft.toml check-config
//! ```
//!
//! Event lines look like:
//!
//! ```text
//! {"instance":"A1","signal":"input-real","value":[0,1,0,0]}
//! {"instance":"A4","signal":"process"}
//! ```
//!
//! # Environment Variables
//!
//! - `PVFFT_CONFIG`: Path to the configuration file (default: `./pvfft.toml`)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

use pv_fft::config::{self, EngineConfig};
use pv_fft::service::{EngineRegistry, EngineService, StdinSource};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "pv-fft")]
#[command(about = "Windowed real-input FFT engine for process variables")]
#[command(version)]
struct CliArgs {
    /// Configuration file (overrides PVFFT_CONFIG and ./pvfft.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Run all instances, reading JSON events from stdin (default)
    Run,
    /// Print the configured setup of one instance
    Show {
        /// Instance name, e.g. A1
        instance: String,
    },
    /// Load and validate the configuration, then print it
    CheckConfig,
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(EngineConfig::load()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    config::init(load_config(args.config.as_ref())?);
    let engine_config = config::get().context("Engine configuration not initialized")?;

    match args.command.unwrap_or(SubCommand::Run) {
        SubCommand::CheckConfig => {
            let rendered = engine_config.to_toml().context("Failed to render config")?;
            println!("{}", rendered);
            info!(instances = engine_config.instances.len(), "Configuration is valid");
            Ok(())
        }
        SubCommand::Show { instance } => {
            let registry = EngineRegistry::from_config(engine_config);
            let report = registry
                .show(&instance)
                .with_context(|| format!("No engine instance named '{}'", instance))?;
            println!("{}", report);
            Ok(())
        }
        SubCommand::Run => run(engine_config).await,
    }
}

async fn run(engine_config: &EngineConfig) -> Result<()> {
    info!("pv-fft starting with {} instance(s)", engine_config.instances.len());
    for instance in &engine_config.instances {
        info!(
            "  {} | trigger: {} | window: {} | sample freq: {} Hz",
            instance.name,
            instance.trigger,
            instance.window_or(&engine_config.defaults),
            instance.sample_freq_or(&engine_config.defaults)
        );
    }

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let service = EngineService::start(engine_config, cancel_token);
    let mut source = StdinSource::stdin();
    let stats = service.drive(&mut source).await;

    for name in service.names() {
        if let Some(handle) = service.find(name) {
            let outputs = handle.outputs();
            info!(
                "  {} | executions: {} | alarm: {} | last exec: {:.6}s",
                name,
                outputs.count(),
                outputs.alarm(),
                outputs.exec_time()
            );
        }
    }
    info!(
        "Processed {} events ({} published, {} faulted, {} rejected)",
        stats.events, stats.executions, stats.faults, stats.rejected
    );

    service.shutdown().await;
    info!("pv-fft shutdown complete");
    Ok(())
}
