//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, retry bounds ordered)
//! - Check every chain entry can actually be served
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::chain::types::PayoutMode;
use crate::config::schema::EngineConfig;

/// One semantic problem in a config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed config, collecting every error.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.vault.host_key_env.trim().is_empty() {
        errors.push(ValidationError::new("vault.host_key_env", "must not be empty"));
    }

    if config.monitor.poll_interval_secs == 0 {
        errors.push(ValidationError::new("monitor.poll_interval_secs", "must be greater than 0"));
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }
    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            "must not exceed retries.max_delay_ms",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    let mut seen = HashSet::new();
    for (i, chain) in config.chains.iter().enumerate() {
        let field = |name: &str| format!("chains[{}].{}", i, name);

        if !seen.insert(chain.chain) {
            errors.push(ValidationError::new(
                field("chain"),
                format!("{} is configured more than once", chain.chain),
            ));
        }

        if !chain.chain.is_evm() {
            errors.push(ValidationError::new(
                field("chain"),
                format!("no built-in adapter for {}", chain.chain),
            ));
        }

        for (name, raw) in std::iter::once(("rpc_url", &chain.rpc_url))
            .chain(chain.failover_urls.iter().map(|u| ("failover_urls", u)))
        {
            if url::Url::parse(raw).is_err() {
                errors.push(ValidationError::new(field(name), format!("'{}' is not a valid URL", raw)));
            }
        }

        if chain.rpc_timeout_secs == 0 {
            errors.push(ValidationError::new(field("rpc_timeout_secs"), "must be greater than 0"));
        }

        if chain.payout_mode() == PayoutMode::AuthorizedContract {
            match chain.contract_address.as_deref() {
                None => errors.push(ValidationError::new(
                    field("contract_address"),
                    "required for authorized contract payouts",
                )),
                Some(raw) if crate::chain::evm::parse_address(raw).is_err() => {
                    errors.push(ValidationError::new(
                        field("contract_address"),
                        format!("'{}' is not a valid address", raw),
                    ))
                }
                Some(_) => {}
            }
            if chain.attestor_key_env.trim().is_empty() {
                errors.push(ValidationError::new(field("attestor_key_env"), "must not be empty"));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
