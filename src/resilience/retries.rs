//! Bounded retry of read-only chain calls.
//!
//! # Responsibilities
//! - Retry transient failures (node unreachable, timeout) with backoff
//! - Surface permanent failures immediately
//! - Count every retry in `escrow_read_retries_total`

use std::future::Future;

use crate::config::schema::RetryConfig;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

/// Errors that say whether repeating the same read could succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for crate::chain::ChainError {
    fn is_transient(&self) -> bool {
        crate::chain::ChainError::is_transient(self)
    }
}

/// Run `op` up to `config.max_attempts` times while it fails transiently.
///
/// Must only wrap operations without side effects.
pub async fn retry_read<T, E, F, Fut>(config: &RetryConfig, operation: &'static str, mut op: F) -> Result<T, E>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = calculate_backoff(attempt, config.base_delay_ms, config.max_delay_ms);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient read failure, retrying"
                );
                metrics::record_read_retry(operation);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
