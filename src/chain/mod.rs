//! Chain abstraction.
//!
//! # Data Flow
//! ```text
//! EscrowCoordinator
//!     → registry.rs (ChainKind → RegisteredAdapter)
//!     → adapter.rs (identity, balance, transfer, broadcast)
//!     → PayoutRoute::Direct      → build_transfer + broadcast
//!     → PayoutRoute::Authorized  → attestation_message + sign + submit_payout
//! ```
//!
//! The per-chain variants collapse into two payout routes behind one trait.
//! `evm.rs` provides one reference adapter for each route; other chain
//! families plug in by implementing the same traits.

pub mod adapter;
pub mod evm;
pub mod registry;
pub mod types;

pub use adapter::{
    AttestationSigner, AuthorizedContractAdapter, ChainAdapter, ChainError, GeneratedIdentity,
    SignedTransaction, TransactionId,
};
pub use registry::{AdapterRegistry, PayoutRoute, RegisteredAdapter};
pub use types::{Amount, AmountError, ChainKind, PayoutMode};
