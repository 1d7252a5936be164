//! Error taxonomy for escrow operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::chain::{Amount, ChainError, ChainKind};
use crate::escrow::session::{EscrowState, SessionId};
use crate::escrow::store::StoreError;
use crate::vault::VaultError;

pub type EscrowResult<T> = Result<T, EscrowError>;

/// The operation that was attempting a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Create,
    CheckDeposits,
    ConfirmDeposit,
    Settle,
    Refund,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transition::Create => "create",
            Transition::CheckDeposits => "check_deposits",
            Transition::ConfirmDeposit => "confirm_deposit",
            Transition::Settle => "settle",
            Transition::Refund => "refund",
        };
        f.write_str(name)
    }
}

/// Coarse grouping deciding how a caller should react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Key or ciphertext problem. Always fatal to the operation.
    Custody,
    /// Bad request or wrong state. Not retryable.
    Validation,
    /// Not enough funds yet. May succeed later.
    Balance,
    /// Chain or node failure.
    Network,
    /// Storage failure.
    Internal,
}

/// Main error type for escrow operations.
#[derive(Debug, Error)]
pub enum EscrowError {
    #[error("custody failure: {0}")]
    Custody(#[from] VaultError),

    #[error("winner {0} is not a player in this session")]
    InvalidWinner(String),

    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("session is {0}, not active")]
    NotActive(EscrowState),

    #[error("session already settled")]
    AlreadySettled,

    #[error("insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: Amount, required: Amount },

    #[error("broadcast rejected: {0}")]
    BroadcastRejected(String),

    #[error("adapter unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("no adapter registered for {0}")]
    UnsupportedChain(ChainKind),

    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("session store: {0}")]
    Store(#[from] StoreError),

    /// An error raised while `transition` was running on `session_id`.
    #[error("session {session_id} {transition}: {source}")]
    Session {
        session_id: SessionId,
        transition: Transition,
        source: Box<EscrowError>,
    },
}

impl EscrowError {
    /// Attach session context. Already-wrapped errors are returned unchanged.
    pub fn in_session(self, session_id: SessionId, transition: Transition) -> Self {
        match self {
            EscrowError::Session { .. } => self,
            other => EscrowError::Session {
                session_id,
                transition,
                source: Box::new(other),
            },
        }
    }

    /// The underlying error without session context.
    pub fn root(&self) -> &EscrowError {
        match self {
            EscrowError::Session { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self.root() {
            EscrowError::Custody(_) => ErrorClass::Custody,
            EscrowError::InvalidWinner(_)
            | EscrowError::InvalidAddress(_)
            | EscrowError::InvalidAmount(_)
            | EscrowError::NotActive(_)
            | EscrowError::AlreadySettled
            | EscrowError::UnsupportedChain(_)
            | EscrowError::SessionNotFound(_) => ErrorClass::Validation,
            EscrowError::InsufficientBalance { .. } => ErrorClass::Balance,
            EscrowError::BroadcastRejected(_) | EscrowError::AdapterUnavailable(_) => ErrorClass::Network,
            EscrowError::Store(_) => ErrorClass::Internal,
            EscrowError::Session { .. } => ErrorClass::Internal,
        }
    }
}

impl From<ChainError> for EscrowError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::InvalidAddress(address) => EscrowError::InvalidAddress(address),
            ChainError::InsufficientBalance { available, required } => {
                EscrowError::InsufficientBalance { available, required }
            }
            ChainError::BroadcastRejected(reason) => EscrowError::BroadcastRejected(reason),
            ChainError::Unsupported { chain, operation } => {
                tracing::debug!(chain = %chain, operation = %operation, "Adapter does not support operation");
                EscrowError::UnsupportedChain(chain)
            }
            // Unusable escrow secret: needs an operator, like an outage.
            ChainError::InvalidSecret(reason) => EscrowError::AdapterUnavailable(reason),
            ChainError::Unavailable(reason) => EscrowError::AdapterUnavailable(reason),
        }
    }
}
