//! Public escrow API.
//!
//! # Data Flow
//! ```text
//! create_escrow  → adapter.generate_identity → vault::encrypt → store.insert
//! check_deposits → DepositMonitor.observe → CAS(flags, balance)
//! settle         → PayoutAuthorizer.prepare → CAS(Active → Settled) → submit
//! refund         → DepositMonitor.observe → CAS(flags) → plan → CAS(AwaitingDeposits → Refunded) → submit each leg
//! ```
//!
//! # Concurrency
//! Every state change is a compare-and-swap against the version it was read
//! at. Network calls happen outside any lock. A payout is only submitted
//! after its CAS succeeded, so concurrent settlements of one session produce
//! exactly one submission. A submission that fails after the CAS moves the
//! session to `Failed`; `Active` is never reopened. So does a custody fault
//! or a chain outage that outlasts the read retries while preparing one.

use std::sync::Arc;

use crate::chain::{
    AdapterRegistry, Amount, ChainKind, PayoutMode, RegisteredAdapter, TransactionId,
};
use crate::config::schema::{DepositAttribution, RetryConfig};
use crate::escrow::error::{ErrorClass, EscrowError, EscrowResult, Transition};
use crate::escrow::monitor::{DepositCheck, DepositMonitor};
use crate::escrow::payout::{plan_refunds, PayoutAuthorizer, RefundTransfer};
use crate::escrow::session::{EscrowIdentity, EscrowSession, EscrowState, Player, SessionId};
use crate::escrow::store::{SessionStore, StoreError};
use crate::observability::metrics;
use crate::vault::{self, SecretProvider};

/// Attempts at a compare-and-swap before giving up on a contended session.
const MAX_CAS_ATTEMPTS: usize = 8;

/// Outcome of a successful settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementReceipt {
    pub session_id: SessionId,
    pub winner: String,
    /// The payout transaction.
    pub tx_id: TransactionId,
    /// Every transaction issued, `tx_id` last.
    pub tx_ids: Vec<TransactionId>,
    pub mode: PayoutMode,
}

/// Outcome of a successful refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundReceipt {
    pub session_id: SessionId,
    pub transfers: Vec<RefundTransfer>,
    pub tx_ids: Vec<TransactionId>,
}

pub struct EscrowCoordinator {
    registry: AdapterRegistry,
    store: Arc<dyn SessionStore>,
    secrets: Arc<dyn SecretProvider>,
    monitor: DepositMonitor,
    payouts: PayoutAuthorizer,
}

impl EscrowCoordinator {
    pub fn new(registry: AdapterRegistry, store: Arc<dyn SessionStore>, secrets: Arc<dyn SecretProvider>) -> Self {
        let retries = RetryConfig::default();
        Self {
            registry,
            store,
            secrets,
            monitor: DepositMonitor::new(DepositAttribution::default(), retries.clone()),
            payouts: PayoutAuthorizer::new(retries),
        }
    }

    /// Retry policy for balance and fee reads.
    pub fn with_retries(mut self, retries: RetryConfig) -> Self {
        self.monitor = DepositMonitor::new(self.monitor.attribution(), retries.clone());
        self.payouts = PayoutAuthorizer::new(retries);
        self
    }

    pub fn with_attribution(mut self, attribution: DepositAttribution) -> Self {
        self.monitor = DepositMonitor::new(attribution, self.retries());
        self
    }

    fn retries(&self) -> RetryConfig {
        self.payouts.retries().clone()
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    fn adapter(&self, chain: ChainKind) -> EscrowResult<&RegisteredAdapter> {
        self.registry.get(chain).ok_or(EscrowError::UnsupportedChain(chain))
    }

    pub async fn get(&self, id: SessionId) -> EscrowResult<EscrowSession> {
        self.store.get(id).await?.ok_or(EscrowError::SessionNotFound(id))
    }

    pub async fn list(&self, state: Option<EscrowState>) -> EscrowResult<Vec<EscrowSession>> {
        Ok(self.store.list(state).await?)
    }

    /// Load, modify and write back a session, retrying on version conflicts.
    ///
    /// `apply` runs against the freshest stored copy on every attempt.
    async fn update<F>(&self, id: SessionId, mut apply: F) -> EscrowResult<EscrowSession>
    where
        F: FnMut(&mut EscrowSession) -> EscrowResult<()> + Send,
    {
        let mut last_conflict = None;

        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.get(id).await?;
            let expected = current.version();
            let mut updated = current;
            apply(&mut updated)?;

            match self.store.compare_and_swap(updated, expected).await {
                Ok(stored) => return Ok(stored),
                Err(conflict @ StoreError::Conflict { .. }) => {
                    tracing::debug!(session_id = %id, error = %conflict, "Session changed concurrently, retrying");
                    last_conflict = Some(conflict);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(EscrowError::Store(last_conflict.unwrap_or(StoreError::NotFound(id))))
    }

    /// Record `from → Failed`. The original error is what the caller sees.
    async fn mark_failed(&self, id: SessionId, transition: Transition, reason: &EscrowError, issued: Vec<TransactionId>) {
        let reason = reason.root().to_string();
        let result = self
            .update(id, |s| s.fail(transition, reason.clone(), issued.clone()))
            .await;

        match result {
            Ok(session) => {
                let from = session
                    .failure()
                    .map(|f| f.from_state.as_str())
                    .unwrap_or("unknown");
                metrics::record_transition(from, EscrowState::Failed.as_str());
                tracing::error!(
                    session_id = %id,
                    transition = %transition,
                    from = from,
                    reason = %reason,
                    "Session failed, operator action required"
                );
            }
            Err(e) => {
                tracing::error!(session_id = %id, error = %e, "Could not record session failure");
            }
        }
    }

    /// Fail the session when a payout could not be prepared for reasons
    /// retrying the request will not fix.
    async fn abort_prepare(&self, id: SessionId, transition: Transition, e: &EscrowError) {
        if matches!(e.class(), ErrorClass::Custody | ErrorClass::Network) {
            self.mark_failed(id, transition, e, Vec::new()).await;
        }
    }

    /// Open a new escrow for two players on `chain`.
    pub async fn create_escrow(
        &self,
        chain: ChainKind,
        bet_amount: Amount,
        player1: &str,
        player2: &str,
    ) -> EscrowResult<EscrowSession> {
        let registered = self.adapter(chain)?;
        let adapter = registered.adapter.as_ref();

        if bet_amount.is_zero() {
            return Err(EscrowError::InvalidAmount("bet must be greater than zero".to_string()));
        }
        if bet_amount.checked_mul(2).is_none() {
            return Err(EscrowError::InvalidAmount(format!("bet {} overflows the pot", bet_amount)));
        }

        let player1 = player1.trim();
        let player2 = player2.trim();
        adapter.validate_address(player1)?;
        adapter.validate_address(player2)?;
        if player1.eq_ignore_ascii_case(player2) {
            return Err(EscrowError::InvalidAddress(format!(
                "{} (both players share one address)",
                player2
            )));
        }

        let key = self.secrets.get_key().await?;
        let identity = adapter.generate_identity().await?;
        let encrypted_secret = vault::encrypt(&identity.secret, &key)?;
        let address = identity.address.clone();
        drop(identity);

        let mut session = EscrowSession::new(
            chain,
            bet_amount,
            player1,
            player2,
            EscrowIdentity {
                address,
                encrypted_secret,
            },
        );
        session.open_for_deposits()?;
        let stored = self.store.insert(session).await?;

        metrics::record_session_created(chain.ticker());
        metrics::record_transition(EscrowState::Created.as_str(), EscrowState::AwaitingDeposits.as_str());
        tracing::info!(
            session_id = %stored.id(),
            chain = %chain,
            bet = %bet_amount.format_decimal(chain.decimals()),
            escrow_address = %stored.escrow_address(),
            mode = %registered.mode(),
            "Escrow created"
        );

        Ok(stored)
    }

    /// Refresh the balance and deposit flags of a session.
    ///
    /// Sessions not awaiting deposits are returned unchanged. A failed balance
    /// read is reported without touching the session.
    pub async fn check_deposits(&self, id: SessionId) -> EscrowResult<EscrowSession> {
        let ctx = |e: EscrowError| e.in_session(id, Transition::CheckDeposits);

        let session = self.get(id).await.map_err(ctx)?;
        if session.state() != EscrowState::AwaitingDeposits {
            return Ok(session);
        }

        let registered = self.adapter(session.chain()).map_err(ctx)?;
        let check = self
            .monitor
            .observe(registered.adapter.as_ref(), &session)
            .await
            .map_err(|e| ctx(e.into()))?;

        self.apply_check(&session, &check).await.map_err(ctx)
    }

    /// Store the balance and any newly confirmed deposits from `check`.
    async fn apply_check(&self, session: &EscrowSession, check: &DepositCheck) -> EscrowResult<EscrowSession> {
        let id = session.id();
        let updated = self
            .update(id, |s| {
                if s.state() != EscrowState::AwaitingDeposits {
                    return Ok(());
                }
                s.record_balance(check.balance);
                for player in Player::BOTH {
                    if check.confirmed(player) && !s.has_deposited(player) {
                        s.record_deposit(player)?;
                    }
                }
                Ok(())
            })
            .await?;

        for player in Player::BOTH {
            if updated.has_deposited(player) && !session.has_deposited(player) {
                tracing::info!(
                    session_id = %id,
                    player = %player,
                    balance = %check.balance,
                    "Deposit confirmed"
                );
            }
        }
        if updated.state() == EscrowState::Active && session.state() != EscrowState::Active {
            metrics::record_transition(EscrowState::AwaitingDeposits.as_str(), EscrowState::Active.as_str());
            tracing::info!(session_id = %id, balance = %check.balance, "Both deposits confirmed, session active");
        }

        Ok(updated)
    }

    /// Operator confirmation of one player's deposit.
    pub async fn confirm_deposit(&self, id: SessionId, player: Player) -> EscrowResult<EscrowSession> {
        let ctx = |e: EscrowError| e.in_session(id, Transition::ConfirmDeposit);

        let before = self.get(id).await.map_err(ctx)?;
        if before.has_deposited(player) {
            return Ok(before);
        }

        let updated = self
            .update(id, |s| {
                if s.has_deposited(player) {
                    return Ok(());
                }
                s.record_deposit(player).map(|_| ())
            })
            .await
            .map_err(ctx)?;

        if updated.has_deposited(player) && !before.has_deposited(player) {
            tracing::info!(session_id = %id, player = %player, "Deposit confirmed manually");
        }
        if updated.state() == EscrowState::Active && before.state() != EscrowState::Active {
            metrics::record_transition(EscrowState::AwaitingDeposits.as_str(), EscrowState::Active.as_str());
            tracing::info!(session_id = %id, "Both deposits confirmed, session active");
        }

        Ok(updated)
    }

    /// Pay the pot to `winner`.
    pub async fn settle(&self, id: SessionId, winner: &str) -> EscrowResult<SettlementReceipt> {
        let ctx = |e: EscrowError| e.in_session(id, Transition::Settle);

        let session = self.get(id).await.map_err(ctx)?;
        match session.state() {
            EscrowState::Active => {}
            EscrowState::Settled => return Err(ctx(EscrowError::AlreadySettled)),
            other => return Err(ctx(EscrowError::NotActive(other))),
        }
        let player = session
            .player_for(winner)
            .ok_or_else(|| ctx(EscrowError::InvalidWinner(winner.to_string())))?;
        let canonical = session.player_address(player).to_string();

        let registered = self.adapter(session.chain()).map_err(ctx)?;
        let key = self.secrets.get_key().await.map_err(|e| ctx(e.into()))?;

        let prepared = match self
            .payouts
            .prepare_settlement(registered, &session, &canonical, &key)
            .await
        {
            Ok(prepared) => prepared,
            Err(e) => {
                self.abort_prepare(id, Transition::Settle, &e).await;
                return Err(ctx(e));
            }
        };
        drop(key);

        // Exactly one caller gets past this point per session.
        self.update(id, |s| s.settle(&canonical).map(|_| ()))
            .await
            .map_err(ctx)?;
        metrics::record_transition(EscrowState::Active.as_str(), EscrowState::Settled.as_str());
        tracing::info!(
            session_id = %id,
            winner = %canonical,
            kind = prepared.kind(),
            expected_tx = ?prepared.expected_tx_id(),
            "Settlement committed, submitting payout"
        );

        let chain = session.chain().ticker();
        let tx_ids = match self.payouts.execute(registered, &prepared).await {
            Ok(tx_ids) => tx_ids,
            Err(failure) => {
                let e = EscrowError::from(failure.error);
                metrics::record_payout(chain, "settle", "rejected");
                self.mark_failed(id, Transition::Settle, &e, failure.issued).await;
                return Err(ctx(e));
            }
        };
        metrics::record_payout(chain, "settle", "success");

        let recorded = tx_ids.clone();
        if let Err(e) = self.update(id, |s| s.record_payout(recorded.clone())).await {
            tracing::error!(session_id = %id, tx_ids = ?tx_ids, error = %e, "Payout submitted but not recorded");
            return Err(ctx(e));
        }

        let tx_id = match tx_ids.last() {
            Some(tx_id) => tx_id.clone(),
            None => return Err(ctx(EscrowError::BroadcastRejected("no transaction issued".to_string()))),
        };
        tracing::info!(session_id = %id, winner = %canonical, tx_id = %tx_id, "Session settled");
        Ok(SettlementReceipt {
            session_id: id,
            winner: canonical,
            tx_id,
            tx_ids,
            mode: registered.mode(),
        })
    }

    /// Return deposits to the players who made them. Only before activation.
    ///
    /// Depositors and the amount refunded come from the same balance read. A
    /// deposit confirmed by that read that completes the pot makes the session
    /// active instead, and nothing is refunded.
    pub async fn refund(&self, id: SessionId) -> EscrowResult<RefundReceipt> {
        let ctx = |e: EscrowError| e.in_session(id, Transition::Refund);

        let session = self.get(id).await.map_err(ctx)?;
        if session.state() != EscrowState::AwaitingDeposits {
            return Err(ctx(EscrowError::NotActive(session.state())));
        }

        let registered = self.adapter(session.chain()).map_err(ctx)?;
        let adapter = registered.adapter.as_ref();

        let check = match self.monitor.observe(adapter, &session).await {
            Ok(check) => check,
            Err(e) => {
                let e = EscrowError::from(e);
                self.abort_prepare(id, Transition::Refund, &e).await;
                return Err(ctx(e));
            }
        };
        let session = self.apply_check(&session, &check).await.map_err(ctx)?;
        if session.state() != EscrowState::AwaitingDeposits {
            return Err(ctx(EscrowError::NotActive(session.state())));
        }
        let depositors = session.depositors();

        let transfers = if depositors.is_empty() {
            if !check.balance.is_zero() {
                tracing::warn!(
                    session_id = %id,
                    balance = %check.balance,
                    "Refunding with no confirmed depositor; escrow balance stays in place"
                );
            }
            Vec::new()
        } else {
            let fee = match self.payouts.read_fee(adapter).await {
                Ok(fee) => fee,
                Err(e) => {
                    let e = EscrowError::from(e);
                    self.abort_prepare(id, Transition::Refund, &e).await;
                    return Err(ctx(e));
                }
            };
            let transfers = plan_refunds(&session, check.balance, fee, adapter.minimum_reserve()).map_err(ctx)?;

            let spent = transfers
                .iter()
                .filter_map(|leg| leg.amount.checked_add(fee))
                .fold(adapter.minimum_reserve(), |total, leg| total.checked_add(leg).unwrap_or(total));
            if let Some(residual) = check.balance.checked_sub(spent).filter(|r| !r.is_zero()) {
                tracing::warn!(
                    session_id = %id,
                    balance = %check.balance,
                    residual = %residual,
                    "Escrow holds more than the confirmed deposits; residual stays in place"
                );
            }
            transfers
        };

        let key = if transfers.is_empty() {
            None
        } else {
            Some(self.secrets.get_key().await.map_err(|e| ctx(e.into()))?)
        };

        let planned_version = session.version();
        self.update(id, |s| {
            if s.depositors() != depositors {
                return Err(EscrowError::Store(StoreError::Conflict {
                    expected: planned_version,
                    actual: s.version(),
                }));
            }
            s.refund()
        })
        .await
        .map_err(ctx)?;
        metrics::record_transition(EscrowState::AwaitingDeposits.as_str(), EscrowState::Refunded.as_str());

        let chain = session.chain().ticker();
        let mut issued = Vec::with_capacity(transfers.len());
        if let Some(key) = key {
            for leg in &transfers {
                let submitted = match self
                    .payouts
                    .sign_transfer(adapter, &session, &leg.to, leg.amount, &key)
                    .await
                {
                    Ok(tx) => adapter.broadcast(&tx).await.map_err(EscrowError::from),
                    Err(e) => Err(e),
                };

                match submitted {
                    Ok(tx_id) => {
                        tracing::info!(
                            session_id = %id,
                            player = %leg.player,
                            to = %leg.to,
                            amount = %leg.amount,
                            tx_id = %tx_id,
                            "Refund submitted"
                        );
                        issued.push(tx_id);
                    }
                    Err(e) => {
                        metrics::record_payout(chain, "refund", "rejected");
                        self.mark_failed(id, Transition::Refund, &e, issued).await;
                        return Err(ctx(e));
                    }
                }
            }
        }
        metrics::record_payout(chain, "refund", "success");

        let recorded = issued.clone();
        if let Err(e) = self.update(id, |s| s.record_payout(recorded.clone())).await {
            tracing::error!(session_id = %id, tx_ids = ?issued, error = %e, "Refund submitted but not recorded");
            return Err(ctx(e));
        }

        tracing::info!(session_id = %id, legs = transfers.len(), "Session refunded");
        Ok(RefundReceipt {
            session_id: id,
            transfers,
            tx_ids: issued,
        })
    }
}
