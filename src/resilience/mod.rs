//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Chain read (balance, fee estimate):
//!     → retries.rs (retry transient failures with backoff)
//!     → backoff.rs (exponential delay with jitter)
//!
//! Chain write (broadcast, contract payout):
//!     → executed exactly once; failures surface to the coordinator
//! ```
//!
//! # Design Decisions
//! - Only read operations are retried
//! - A signed transfer is never resubmitted automatically
//! - Jittered backoff prevents synchronized retries across sessions

pub mod backoff;
pub mod retries;

pub use backoff::calculate_backoff;
pub use retries::{retry_read, Transient};
