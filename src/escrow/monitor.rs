//! Deposit detection.
//!
//! # Responsibilities
//! - Read the escrow account balance (retried on transient failures)
//! - Decide which players' deposits the balance confirms
//! - Drive periodic checks of every session still awaiting deposits
//!
//! Both players pay into the same escrow address, so attribution under
//! `BalanceThreshold` is a heuristic: player 1 counts as deposited at
//! balance ≥ bet, player 2 at balance ≥ 2×bet. `ManualConfirmation` never
//! sets flags from balances; an operator confirms each deposit.

use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use crate::chain::{Amount, ChainAdapter, ChainError};
use crate::config::schema::{DepositAttribution, RetryConfig};
use crate::escrow::coordinator::EscrowCoordinator;
use crate::escrow::session::{EscrowSession, EscrowState, Player};
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::resilience::retry_read;

/// Balance at which `player`'s deposit counts as confirmed.
pub fn deposit_threshold(bet: Amount, player: Player) -> Option<Amount> {
    match player {
        Player::One => Some(bet),
        Player::Two => bet.checked_mul(2),
    }
}

/// Result of one balance read against a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositCheck {
    pub balance: Amount,
    pub player1: bool,
    pub player2: bool,
}

impl DepositCheck {
    pub fn confirmed(&self, player: Player) -> bool {
        match player {
            Player::One => self.player1,
            Player::Two => self.player2,
        }
    }
}

/// Reads escrow balances and applies the attribution policy.
#[derive(Debug, Clone)]
pub struct DepositMonitor {
    attribution: DepositAttribution,
    retries: RetryConfig,
}

impl DepositMonitor {
    pub fn new(attribution: DepositAttribution, retries: RetryConfig) -> Self {
        Self { attribution, retries }
    }

    pub fn attribution(&self) -> DepositAttribution {
        self.attribution
    }

    /// Read the balance once and evaluate both players against it.
    pub async fn observe(
        &self,
        adapter: &dyn ChainAdapter,
        session: &EscrowSession,
    ) -> Result<DepositCheck, ChainError> {
        let address = session.escrow_address();
        let result = retry_read(&self.retries, "get_balance", || adapter.get_balance(address)).await;

        let balance = match result {
            Ok(balance) => balance,
            Err(e) => {
                metrics::record_deposit_check(session.chain().ticker(), "error");
                return Err(e);
            }
        };

        let confirms = |player: Player| match self.attribution {
            DepositAttribution::BalanceThreshold => deposit_threshold(session.bet_amount(), player)
                .map_or(false, |threshold| balance >= threshold),
            DepositAttribution::ManualConfirmation => false,
        };

        let check = DepositCheck {
            balance,
            player1: confirms(Player::One),
            player2: confirms(Player::Two),
        };

        let outcome = match (check.player1, check.player2) {
            (true, true) => "both",
            (true, false) | (false, true) => "partial",
            (false, false) => "none",
        };
        metrics::record_deposit_check(session.chain().ticker(), outcome);
        tracing::debug!(
            session_id = %session.id(),
            chain = %session.chain(),
            balance = %balance,
            player1 = check.player1,
            player2 = check.player2,
            "Deposit check"
        );

        Ok(check)
    }

    /// Whether the escrow balance confirms `player`'s deposit.
    pub async fn check_deposit(
        &self,
        adapter: &dyn ChainAdapter,
        session: &EscrowSession,
        player: Player,
    ) -> Result<bool, ChainError> {
        Ok(self.observe(adapter, session).await?.confirmed(player))
    }
}

/// Counts from one polling round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub checked: usize,
    pub activated: usize,
    pub errors: usize,
}

/// Periodically checks every session in `AwaitingDeposits`.
pub struct DepositPoller {
    coordinator: Arc<EscrowCoordinator>,
    interval: Duration,
}

impl DepositPoller {
    pub fn new(coordinator: Arc<EscrowCoordinator>, interval: Duration) -> Self {
        Self { coordinator, interval }
    }

    pub async fn run(self, mut shutdown: ShutdownSignal) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Deposit poller starting");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = self.poll_once().await;
                    if summary.checked > 0 {
                        tracing::info!(
                            checked = summary.checked,
                            activated = summary.activated,
                            errors = summary.errors,
                            "Deposit poll complete"
                        );
                    }
                }
                _ = shutdown.triggered() => {
                    tracing::info!("Deposit poller received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Check each pending session once. Failures are logged and counted.
    pub async fn poll_once(&self) -> PollSummary {
        let mut summary = PollSummary::default();

        let pending = match self.coordinator.list(Some(EscrowState::AwaitingDeposits)).await {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list pending sessions");
                summary.errors += 1;
                return summary;
            }
        };

        for session in pending {
            summary.checked += 1;
            match self.coordinator.check_deposits(session.id()).await {
                Ok(updated) if updated.state() == EscrowState::Active => summary.activated += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(session_id = %session.id(), error = %e, "Deposit check failed");
                    summary.errors += 1;
                }
            }
        }

        summary
    }
}
