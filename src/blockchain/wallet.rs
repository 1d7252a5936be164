//! Server wallet: attests winners and pays gas for contract payouts.
//!
//! # Security
//! - The private key is loaded ONLY from an environment variable
//! - Keys are never logged or serialized

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::blockchain::types::{BlockchainError, BlockchainResult};
use crate::chain::adapter::{AttestationSigner, ChainError};

/// Default environment variable holding the server key.
pub const ATTESTOR_KEY_ENV_VAR: &str = "ESCROW_ATTESTOR_PRIVATE_KEY";

/// Server signing identity with nonce tracking for its own transactions.
#[derive(Debug, Clone)]
pub struct Wallet {
    signer: PrivateKeySigner,
    /// Next nonce for sequential contract calls, shared across clones.
    nonce: Arc<AtomicU64>,
    chain_id: u64,
}

impl Wallet {
    /// Create a wallet from a hex-encoded private key (with or without 0x prefix).
    pub fn from_private_key(private_key_hex: &str, chain_id: u64) -> BlockchainResult<Self> {
        let key_hex = private_key_hex.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| BlockchainError::Wallet(format!("Invalid private key format: {}", e)))?;

        tracing::info!(
            address = %signer.address(),
            chain_id = chain_id,
            "Attestor wallet initialized"
        );

        Ok(Self {
            signer,
            nonce: Arc::new(AtomicU64::new(0)),
            chain_id,
        })
    }

    /// Load the wallet from the named environment variable.
    pub fn from_env(var: &str, chain_id: u64) -> BlockchainResult<Self> {
        let private_key = std::env::var(var).map_err(|_| {
            BlockchainError::Wallet(format!("Environment variable {} not set", var))
        })?;
        Self::from_private_key(&private_key, chain_id)
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub(crate) fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    /// Reserve the next nonce, resynchronising with the chain's view first.
    ///
    /// Takes the larger of the local counter and `chain_nonce` so locally
    /// issued but still pending transactions are not reused.
    pub fn reserve_nonce(&self, chain_nonce: u64) -> u64 {
        self.nonce.fetch_max(chain_nonce, Ordering::SeqCst);
        self.nonce.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_nonce(&self) -> u64 {
        self.nonce.load(Ordering::SeqCst)
    }

    /// Sign arbitrary message bytes (with Ethereum prefix).
    pub async fn sign_message(&self, message: &[u8]) -> BlockchainResult<alloy::signers::Signature> {
        self.signer
            .sign_message(message)
            .await
            .map_err(|e| BlockchainError::Wallet(format!("Message signing failed: {}", e)))
    }
}

#[async_trait]
impl AttestationSigner for Wallet {
    fn signer_address(&self) -> String {
        self.address().to_string()
    }

    async fn sign_attestation(&self, message: &[u8]) -> Result<Vec<u8>, ChainError> {
        let signature = self.sign_message(message).await?;
        Ok(signature.as_bytes().to_vec())
    }
}
