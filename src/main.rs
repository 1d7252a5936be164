//! Escrow daemon (`escrowd`).
//!
//! # Architecture Overview
//!
//! ```text
//!     Game server                ┌──────────────────────────────────────────────┐
//!     ───────────────────────────┼─▶ EscrowCoordinator                          │
//!     create / settle / refund   │      │            │              │           │
//!                                │      ▼            ▼              ▼           │
//!                                │  ┌───────┐  ┌───────────┐  ┌───────────┐    │
//!                                │  │ vault │  │  session  │  │  chain    │────┼──▶ RPC nodes
//!                                │  │AES-GCM│  │  store    │  │ registry  │    │
//!                                │  └───────┘  └───────────┘  └───────────┘    │
//!                                │                   ▲                          │
//!                                │            DepositPoller (interval)          │
//!                                │                                              │
//!                                │  config · observability · resilience ·       │
//!                                │  lifecycle (startup / signals / shutdown)    │
//!                                └──────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use wager_escrow::config::{self, ConfigError};
use wager_escrow::escrow::{EscrowState, JsonFileStore, SessionStore};
use wager_escrow::lifecycle::{self, Shutdown};
use wager_escrow::observability::{logging, metrics};
use wager_escrow::vault;

#[derive(Parser)]
#[command(name = "escrowd")]
#[command(about = "Custodial escrow daemon for two-player wagers", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "escrow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the deposit monitor until SIGINT/SIGTERM (default)
    Run,
    /// Validate the configuration file and exit
    CheckConfig,
    /// Print a new random host key as hex
    Keygen,
    /// Print persisted sessions as JSON
    Sessions {
        /// Only sessions in this state (e.g. awaiting_deposits, failed)
        #[arg(short, long)]
        state: Option<EscrowState>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Run) {
        Command::Keygen => {
            println!("{}", vault::generate_host_key().to_hex().as_str());
            Ok(())
        }
        Command::CheckConfig => {
            let config = load(&cli.config)?;
            println!(
                "{}: ok ({} chain(s), monitor {})",
                cli.config.display(),
                config.chains.len(),
                if config.monitor.enabled { "enabled" } else { "disabled" }
            );
            Ok(())
        }
        Command::Sessions { state } => {
            let config = load(&cli.config)?;
            let path = config
                .store
                .path
                .ok_or("store.path is not configured, nothing is persisted")?;
            let store = JsonFileStore::open(path)?;
            let sessions = store.list(state).await?;
            println!("{}", serde_json::to_string_pretty(&sessions)?);
            Ok(())
        }
        Command::Run => run(&cli.config).await,
    }
}

fn load(path: &Path) -> Result<config::EngineConfig, ConfigError> {
    let result = config::load_config(path);
    if let Err(ConfigError::Validation(errors)) = &result {
        for error in errors {
            eprintln!("config error: {error}");
        }
    }
    result
}

async fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = load(config_path)?;
    logging::init_logging(&config.observability.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        chains = config.chains.len(),
        "escrowd starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => {
                tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    "Failed to parse metrics address"
                );
            }
        }
    }

    let engine = lifecycle::build_engine(&config).await?;
    let shutdown = Shutdown::new();

    let poller = engine
        .poller
        .map(|poller| tokio::spawn(poller.run(shutdown.subscribe())));

    tracing::info!(
        sessions = engine.coordinator.list(None).await?.len(),
        "Engine ready"
    );

    lifecycle::wait_for_signal().await;
    tracing::info!("Shutdown signal received, stopping");
    shutdown.trigger();

    if let Some(handle) = poller {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Deposit poller task failed");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
