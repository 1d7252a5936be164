//! Metrics collection and exposition.
//!
//! # Metrics
//! - `escrow_sessions_created_total` (counter): by chain
//! - `escrow_transitions_total` (counter): by from/to state
//! - `escrow_deposit_checks_total` (counter): by chain, outcome
//! - `escrow_payouts_total` (counter): by chain, kind (settle/refund), outcome
//! - `escrow_read_retries_total` (counter): by operation

use ::metrics::counter;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Install the Prometheus recorder and start its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_session_created(chain: &str) {
    counter!("escrow_sessions_created_total", "chain" => chain.to_string()).increment(1);
}

pub fn record_transition(from: &str, to: &str) {
    counter!("escrow_transitions_total", "from" => from.to_string(), "to" => to.to_string()).increment(1);
}

pub fn record_deposit_check(chain: &str, outcome: &'static str) {
    counter!("escrow_deposit_checks_total", "chain" => chain.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_payout(chain: &str, kind: &'static str, outcome: &'static str) {
    counter!(
        "escrow_payouts_total",
        "chain" => chain.to_string(),
        "kind" => kind,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_read_retry(operation: &'static str) {
    counter!("escrow_read_retries_total", "operation" => operation).increment(1);
}
