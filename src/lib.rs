//! Custodial escrow and reward distribution for two-player wagers.

pub mod blockchain;
pub mod chain;
pub mod config;
pub mod escrow;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod vault;

pub use chain::{Amount, ChainAdapter, ChainKind, PayoutMode};
pub use config::schema::EngineConfig;
pub use escrow::{EscrowCoordinator, EscrowError, EscrowSession, EscrowState, Player, SessionId};
pub use lifecycle::Shutdown;
