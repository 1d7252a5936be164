//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the escrow
//! daemon. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::blockchain::wallet::ATTESTOR_KEY_ENV_VAR;
use crate::chain::types::{Amount, ChainKind, PayoutMode};

/// Root configuration for the escrow engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Where the host encryption key comes from.
    pub vault: VaultConfig,

    /// Deposit polling settings.
    pub monitor: MonitorConfig,

    /// Retry policy for chain read operations.
    pub retries: RetryConfig,

    /// Session persistence.
    pub store: StoreConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// One entry per supported chain.
    pub chains: Vec<ChainConfig>,
}

impl EngineConfig {
    pub fn chain(&self, chain: ChainKind) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain == chain)
    }
}

/// Host key source.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Environment variable holding the hex-encoded 32-byte host key.
    pub host_key_env: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            host_key_env: "ESCROW_HOST_KEY".to_string(),
        }
    }
}

/// How deposits are attributed to players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DepositAttribution {
    /// Player 1 at balance ≥ bet, player 2 at balance ≥ 2×bet.
    #[default]
    BalanceThreshold,
    /// Operator confirms each deposit explicitly.
    ManualConfirmation,
}

/// Deposit monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Run the background deposit poller.
    pub enabled: bool,

    /// Seconds between polling rounds.
    pub poll_interval_secs: u64,

    pub attribution: DepositAttribution,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 30,
            attribution: DepositAttribution::BalanceThreshold,
        }
    }
}

/// Retry configuration for read-only chain calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5000,
        }
    }
}

/// Session persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON file holding all sessions. In-memory only when unset.
    pub path: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9464".to_string(),
        }
    }
}

/// Per-chain adapter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    pub chain: ChainKind,

    /// Payout variant. Falls back to the chain's default when unset.
    pub mode: Option<PayoutMode>,

    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    pub failover_urls: Vec<String>,

    /// Chain ID (e.g., 1 for Ethereum mainnet, 61 for Ethereum Classic).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Gas price multiplier (1.0 = estimated, 1.2 = 20% buffer).
    pub gas_price_multiplier: f64,

    /// Maximum gas price in gwei (protection against spikes).
    pub max_gas_price_gwei: u64,

    /// Fixed fee reserve in minor units. Estimated from gas when unset.
    pub fee_reserve: Option<Amount>,

    /// Balance that must stay on the escrow account after payout.
    pub minimum_reserve: Amount,

    /// Payout contract for the authorized variant.
    pub contract_address: Option<String>,

    /// Environment variable holding the attestor key.
    pub attestor_key_env: String,
}

impl ChainConfig {
    pub fn payout_mode(&self) -> PayoutMode {
        self.mode.unwrap_or_else(|| self.chain.default_payout_mode())
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain: ChainKind::Ethereum,
            mode: None,
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: 1,
            rpc_timeout_secs: 10,
            gas_price_multiplier: 1.2,
            max_gas_price_gwei: 500,
            fee_reserve: None,
            minimum_reserve: Amount::ZERO,
            contract_address: None,
            attestor_key_env: ATTESTOR_KEY_ENV_VAR.to_string(),
        }
    }
}
