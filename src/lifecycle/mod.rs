//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Check host key → Build adapters → Open store → Coordinator
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Poller exits its loop → Process exits
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The host key is verified before any session can be touched
//! - In-flight settlements are never cancelled mid-submission

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::wait_for_signal;
pub use startup::{build_engine, Engine, StartupError};
