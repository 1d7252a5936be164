//! Payout sizing, signing and submission.
//!
//! # Responsibilities
//! - Size payouts from a fresh balance read, never from the cached one
//! - Decrypt the escrow secret only for the span of `build_transfer`
//! - Sweep the escrow into the contract and sign winner attestations for
//!   contract-settled chains
//! - Submit each payout exactly once

use std::sync::Arc;

use crate::chain::{
    Amount, AuthorizedContractAdapter, ChainAdapter, ChainError, PayoutRoute, RegisteredAdapter,
    SignedTransaction, TransactionId,
};
use crate::config::schema::RetryConfig;
use crate::escrow::error::{EscrowError, EscrowResult};
use crate::escrow::session::{EscrowSession, Player};
use crate::resilience::retry_read;
use crate::vault::{self, HostKey};

/// Amount that can leave the escrow account after fees and the chain reserve.
pub fn payable_amount(balance: Amount, fee: Amount, minimum_reserve: Amount) -> EscrowResult<Amount> {
    let withheld = fee.checked_add(minimum_reserve).unwrap_or(Amount::new(u128::MAX));
    match balance.checked_sub(withheld) {
        Some(payable) if !payable.is_zero() => Ok(payable),
        _ => Err(EscrowError::InsufficientBalance {
            available: balance,
            required: withheld.checked_add(Amount::new(1)).unwrap_or(withheld),
        }),
    }
}

/// One refund leg back to a depositor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundTransfer {
    pub player: Player,
    pub to: String,
    pub amount: Amount,
}

/// Split what the escrow holds between the players who deposited.
///
/// Each leg pays its own fee and is capped at the bet minus that fee, so no
/// depositor is paid out of another player's stake. Below the cap the division
/// remainder goes to the first depositor.
pub fn plan_refunds(
    session: &EscrowSession,
    balance: Amount,
    fee: Amount,
    minimum_reserve: Amount,
) -> EscrowResult<Vec<RefundTransfer>> {
    let depositors = session.depositors();
    if depositors.is_empty() {
        return Ok(Vec::new());
    }

    let cap = match session.bet_amount().checked_sub(fee) {
        Some(cap) if !cap.is_zero() => cap,
        _ => {
            return Err(EscrowError::InsufficientBalance {
                available: session.bet_amount(),
                required: fee.checked_add(Amount::new(1)).unwrap_or(fee),
            })
        }
    };

    let legs = depositors.len() as u128;
    let fees = fee.checked_mul(legs).unwrap_or(Amount::new(u128::MAX));
    let total = payable_amount(balance, fees, minimum_reserve)?;

    let share = total.value() / legs;
    let remainder = total.value() % legs;
    if share == 0 {
        return Err(EscrowError::InsufficientBalance {
            available: balance,
            required: balance
                .checked_add(Amount::new(legs - total.value()))
                .unwrap_or(balance),
        });
    }

    Ok(depositors
        .into_iter()
        .enumerate()
        .map(|(i, player)| RefundTransfer {
            player,
            to: session.player_address(player).to_string(),
            amount: Amount::new(if i == 0 { share + remainder } else { share }).min(cap),
        })
        .collect())
}

/// A settlement ready to submit.
pub enum PreparedPayout {
    /// Transfer signed with the escrow identity.
    Direct(SignedTransaction),
    /// Pot swept into the contract, then released by a winner attestation
    /// signed by the server.
    Authorized {
        sweep: SignedTransaction,
        contract: Arc<dyn AuthorizedContractAdapter>,
        winner: String,
        signature: Vec<u8>,
    },
}

impl PreparedPayout {
    pub fn kind(&self) -> &'static str {
        match self {
            PreparedPayout::Direct(_) => "direct",
            PreparedPayout::Authorized { .. } => "authorized",
        }
    }

    /// Id of the first transaction, known before submission.
    pub fn expected_tx_id(&self) -> &TransactionId {
        match self {
            PreparedPayout::Direct(tx) => &tx.tx_id,
            PreparedPayout::Authorized { sweep, .. } => &sweep.tx_id,
        }
    }
}

impl std::fmt::Debug for PreparedPayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreparedPayout::Direct(tx) => f
                .debug_struct("Direct")
                .field("tx_id", &tx.tx_id)
                .field("to", &tx.to)
                .field("amount", &tx.amount)
                .finish(),
            PreparedPayout::Authorized { sweep, winner, .. } => f
                .debug_struct("Authorized")
                .field("sweep_tx_id", &sweep.tx_id)
                .field("amount", &sweep.amount)
                .field("winner", winner)
                .finish(),
        }
    }
}

/// A submission that stopped partway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitFailure {
    /// Transactions the chain accepted before `error`.
    pub issued: Vec<TransactionId>,
    pub error: ChainError,
}

/// Computes and executes payouts for both adapter variants.
#[derive(Debug, Clone)]
pub struct PayoutAuthorizer {
    retries: RetryConfig,
}

impl PayoutAuthorizer {
    pub fn new(retries: RetryConfig) -> Self {
        Self { retries }
    }

    pub fn retries(&self) -> &RetryConfig {
        &self.retries
    }

    pub(crate) async fn read_balance(&self, adapter: &dyn ChainAdapter, address: &str) -> Result<Amount, ChainError> {
        retry_read(&self.retries, "get_balance", || adapter.get_balance(address)).await
    }

    pub(crate) async fn read_fee(&self, adapter: &dyn ChainAdapter) -> Result<Amount, ChainError> {
        retry_read(&self.retries, "fee_reserve", || adapter.fee_reserve()).await
    }

    /// Build the settlement for `winner` without submitting anything.
    ///
    /// `winner` must already be the session's canonical player address.
    pub async fn prepare_settlement(
        &self,
        registered: &RegisteredAdapter,
        session: &EscrowSession,
        winner: &str,
        key: &HostKey,
    ) -> EscrowResult<PreparedPayout> {
        let adapter = registered.adapter.as_ref();
        adapter.validate_address(winner)?;

        let recipient = match &registered.route {
            PayoutRoute::Direct => winner.to_string(),
            PayoutRoute::Authorized { contract, .. } => contract.contract_address().to_string(),
        };

        let balance = self.read_balance(adapter, session.escrow_address()).await?;
        let fee = self.read_fee(adapter).await?;
        let amount = payable_amount(balance, fee, adapter.minimum_reserve())?;

        tracing::info!(
            session_id = %session.id(),
            chain = %session.chain(),
            balance = %balance,
            fee_reserve = %fee,
            minimum_reserve = %adapter.minimum_reserve(),
            amount = %amount,
            to = %recipient,
            "Settlement sized"
        );

        let tx = self.sign_transfer(adapter, session, &recipient, amount, key).await?;

        match &registered.route {
            PayoutRoute::Direct => Ok(PreparedPayout::Direct(tx)),
            PayoutRoute::Authorized { contract, attestor } => {
                let message = contract.attestation_message(winner)?;
                let signature = attestor.sign_attestation(&message).await?;

                tracing::info!(
                    session_id = %session.id(),
                    chain = %session.chain(),
                    contract = %contract.contract_address(),
                    attestor = %attestor.signer_address(),
                    "Winner attestation signed"
                );

                Ok(PreparedPayout::Authorized {
                    sweep: tx,
                    contract: Arc::clone(contract),
                    winner: winner.to_string(),
                    signature,
                })
            }
        }
    }

    /// Decrypt the escrow secret and sign one transfer. The plaintext is
    /// wiped before this returns.
    pub async fn sign_transfer(
        &self,
        adapter: &dyn ChainAdapter,
        session: &EscrowSession,
        to: &str,
        amount: Amount,
        key: &HostKey,
    ) -> EscrowResult<SignedTransaction> {
        let secret = vault::decrypt(&session.escrow_identity().encrypted_secret, key)?;
        let signed = adapter.build_transfer(&secret, to, amount).await;
        drop(secret);
        Ok(signed?)
    }

    /// Submit a prepared settlement. Never retried.
    ///
    /// Returns every transaction issued, the payout itself last.
    pub async fn execute(
        &self,
        registered: &RegisteredAdapter,
        prepared: &PreparedPayout,
    ) -> Result<Vec<TransactionId>, SubmitFailure> {
        match prepared {
            PreparedPayout::Direct(tx) => match registered.adapter.broadcast(tx).await {
                Ok(tx_id) => Ok(vec![tx_id]),
                Err(error) => Err(SubmitFailure {
                    issued: Vec::new(),
                    error,
                }),
            },
            PreparedPayout::Authorized {
                sweep,
                contract,
                winner,
                signature,
            } => {
                let swept = registered.adapter.broadcast(sweep).await.map_err(|error| SubmitFailure {
                    issued: Vec::new(),
                    error,
                })?;
                tracing::info!(
                    contract = %contract.contract_address(),
                    amount = %sweep.amount,
                    tx_id = %swept,
                    "Escrow swept into contract"
                );

                match contract.submit_payout(winner, signature).await {
                    Ok(payout) => Ok(vec![swept, payout]),
                    Err(error) => Err(SubmitFailure {
                        issued: vec![swept],
                        error,
                    }),
                }
            }
        }
    }
}
