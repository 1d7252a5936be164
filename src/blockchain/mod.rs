//! EVM plumbing behind the built-in chain adapters.
//!
//! # Data Flow
//! ```text
//! ChainConfig (RPC URL, chain id, gas limits)
//!     → client.rs (RPC with timeouts and failover)
//!     → transaction.rs (gas quote, offline signing)
//!     → client.rs (single raw submission)
//!
//! Attestor key (environment variable)
//!     → wallet.rs (winner attestations, contract-call nonces)
//! ```
//!
//! # Security Constraints
//! - Private keys ONLY from environment variables or decrypted escrow blobs
//! - Never log private keys or sensitive data
//! - Signed transactions are submitted to one endpoint, once

pub mod client;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use client::BlockchainClient;
pub use transaction::{GasQuote, TxBuilder};
pub use types::{BlockchainError, BlockchainResult};
pub use wallet::Wallet;
