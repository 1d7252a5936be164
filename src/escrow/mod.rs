//! Escrow engine.
//!
//! # Data Flow
//! ```text
//! EscrowCoordinator (public API)
//!     → session.rs     (state machine, invariants)
//!     → store.rs       (versioned compare-and-swap persistence)
//!     → monitor.rs     (balance → deposit flags, periodic poller)
//!     → payout.rs      (sizing, decrypt-and-sign, attestation, submit)
//!     → vault          (host key, AES-256-GCM)
//!     → chain registry (per-chain adapter and payout route)
//! ```

pub mod coordinator;
pub mod error;
pub mod monitor;
pub mod payout;
pub mod session;
pub mod store;

pub use coordinator::{EscrowCoordinator, RefundReceipt, SettlementReceipt};
pub use error::{ErrorClass, EscrowError, EscrowResult, Transition};
pub use monitor::{deposit_threshold, DepositCheck, DepositMonitor, DepositPoller, PollSummary};
pub use payout::{payable_amount, plan_refunds, PayoutAuthorizer, PreparedPayout, RefundTransfer, SubmitFailure};
pub use session::{EscrowIdentity, EscrowSession, EscrowState, FailureRecord, Player, SessionId};
pub use store::{JsonFileStore, MemorySessionStore, SessionStore, StoreError};
