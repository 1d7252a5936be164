//! RPC-layer error definitions.

use thiserror::Error;

use crate::chain::adapter::ChainError;

// Re-export ChainConfig from config module to avoid duplication
pub use crate::config::schema::ChainConfig;

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Node refused a submitted transaction.
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// Invalid private key format or signing failure.
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Gas price exceeded maximum allowed.
    #[error("Gas price {current_gwei} gwei exceeds maximum {max_gwei} gwei")]
    GasPriceTooHigh { current_gwei: u64, max_gwei: u64 },

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },
}

/// Result type for blockchain operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;

impl From<BlockchainError> for ChainError {
    fn from(err: BlockchainError) -> Self {
        match err {
            BlockchainError::Rpc(msg) => ChainError::Unavailable(msg),
            BlockchainError::Rejected(msg) => ChainError::BroadcastRejected(msg),
            BlockchainError::Wallet(msg) => ChainError::InvalidSecret(msg),
            e @ BlockchainError::GasPriceTooHigh { .. } => ChainError::Unavailable(e.to_string()),
            e @ BlockchainError::ChainMismatch { .. } => ChainError::Unavailable(e.to_string()),
        }
    }
}
