//! Startup orchestration.
//!
//! # Responsibilities
//! - Verify the host key is available and well formed
//! - Build one adapter per configured chain
//! - Open the session store (JSON file or memory)
//! - Assemble the coordinator and deposit poller
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::chain::evm::build_registry;
use crate::chain::ChainError;
use crate::config::schema::EngineConfig;
use crate::escrow::{DepositPoller, EscrowCoordinator, JsonFileStore, MemorySessionStore, SessionStore, StoreError};
use crate::vault::{EnvSecretProvider, SecretProvider, VaultError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("host key: {0}")]
    Vault(#[from] VaultError),

    #[error("chain adapters: {0}")]
    Chain(#[from] ChainError),

    #[error("session store: {0}")]
    Store(#[from] StoreError),
}

/// Everything the daemon runs.
pub struct Engine {
    pub coordinator: Arc<EscrowCoordinator>,
    /// `None` when the monitor is disabled in config.
    pub poller: Option<DepositPoller>,
}

/// Wire the engine together from a validated config.
pub async fn build_engine(config: &EngineConfig) -> Result<Engine, StartupError> {
    let secrets = EnvSecretProvider::new(&config.vault.host_key_env);
    secrets.get_key().await?;
    tracing::info!(env = %secrets.var(), "Host key available");

    let registry = build_registry(config).await?;
    tracing::info!(chains = ?registry.chains(), "Chain adapters ready");

    let store: Arc<dyn SessionStore> = match &config.store.path {
        Some(path) => Arc::new(JsonFileStore::open(path)?),
        None => {
            tracing::warn!("No store.path configured, sessions are kept in memory only");
            Arc::new(MemorySessionStore::new())
        }
    };

    let coordinator = Arc::new(
        EscrowCoordinator::new(registry, store, Arc::new(secrets))
            .with_retries(config.retries.clone())
            .with_attribution(config.monitor.attribution),
    );

    let poller = if config.monitor.enabled {
        Some(DepositPoller::new(
            Arc::clone(&coordinator),
            Duration::from_secs(config.monitor.poll_interval_secs),
        ))
    } else {
        tracing::info!("Deposit monitor disabled");
        None
    };

    Ok(Engine { coordinator, poller })
}
