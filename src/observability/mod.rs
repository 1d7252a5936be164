//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Session id and chain are structured fields on every escrow event
//! - Secrets and host keys never reach a log macro
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
