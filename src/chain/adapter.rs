//! The chain adapter boundary.
//!
//! # Responsibilities
//! - Produce chain-native escrow identities
//! - Report balances in minor units
//! - Build, sign and broadcast transfers
//! - For contract-settled chains, submit winner attestations
//!
//! The engine never speaks a chain's wire protocol itself; everything
//! chain-specific goes through these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::chain::types::{Amount, ChainKind};

/// Identifier of a broadcast transaction, in the chain's native rendering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub String);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A freshly generated escrow keypair.
///
/// The secret is wiped from memory when this value is dropped.
pub struct GeneratedIdentity {
    pub address: String,
    pub secret: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for GeneratedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedIdentity")
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// A signed, ready-to-broadcast transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub chain: ChainKind,
    /// Known before broadcast so resubmission can be matched.
    pub tx_id: TransactionId,
    pub from: String,
    pub to: String,
    pub amount: Amount,
    pub raw: Vec<u8>,
}

/// Closed set of failures an adapter may report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    #[error("escrow secret rejected: {0}")]
    InvalidSecret(String),

    #[error("insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: Amount, required: Amount },

    #[error("broadcast rejected: {0}")]
    BroadcastRejected(String),

    #[error("adapter unavailable: {0}")]
    Unavailable(String),

    #[error("operation not supported on {chain}: {operation}")]
    Unsupported { chain: ChainKind, operation: String },
}

impl ChainError {
    /// Whether a read that failed this way may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Unavailable(_))
    }
}

/// Capabilities every chain implementation provides.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// The chain this adapter serves.
    fn chain(&self) -> ChainKind;

    /// Reject malformed addresses before anything is signed.
    fn validate_address(&self, address: &str) -> Result<(), ChainError>;

    /// Balance that must stay in an account for it to remain valid.
    fn minimum_reserve(&self) -> Amount;

    /// Fee to set aside before computing a sendable amount.
    async fn fee_reserve(&self) -> Result<Amount, ChainError>;

    /// Generate a fresh keypair for one escrow session.
    async fn generate_identity(&self) -> Result<GeneratedIdentity, ChainError>;

    /// Current confirmed balance in minor units.
    async fn get_balance(&self, address: &str) -> Result<Amount, ChainError>;

    /// Build and sign a transfer of `amount` from the account owning `from_secret`.
    async fn build_transfer(
        &self,
        from_secret: &[u8],
        to: &str,
        amount: Amount,
    ) -> Result<SignedTransaction, ChainError>;

    /// Submit a signed transaction.
    ///
    /// Resubmitting an already accepted transaction returns its original id
    /// where the chain allows it to be detected.
    async fn broadcast(&self, tx: &SignedTransaction) -> Result<TransactionId, ChainError>;
}

/// Chains where funds are released by a contract or hook after verifying a
/// server-signed winner attestation.
#[async_trait]
pub trait AuthorizedContractAdapter: ChainAdapter {
    /// Address of the contract that releases pooled funds.
    fn contract_address(&self) -> &str;

    /// Message binding `(winner, contract)` that the attestor signs.
    fn attestation_message(&self, winner: &str) -> Result<Vec<u8>, ChainError>;

    /// Call the contract's payout entry point with the signed attestation.
    async fn submit_payout(&self, winner: &str, signature: &[u8])
        -> Result<TransactionId, ChainError>;
}

/// The server's signing identity, used as an oracle for contract payouts.
#[async_trait]
pub trait AttestationSigner: Send + Sync {
    /// Address the contract expects attestations from.
    fn signer_address(&self) -> String;

    /// Sign an attestation message.
    async fn sign_attestation(&self, message: &[u8]) -> Result<Vec<u8>, ChainError>;
}
