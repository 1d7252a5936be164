//! The escrow session aggregate and its state machine.
//!
//! # State Machine
//! ```text
//! Created ──► AwaitingDeposits ──► Active ──► Settled
//!    │               │                │          │ (broadcast failed)
//!    │               ├──► Refunded ───┼──────────┤
//!    ▼               ▼                ▼          ▼
//!  Failed ◄───────────────────────────────────────
//! ```
//!
//! `Settled` and `Refunded` are terminal once their payout is recorded. Until
//! then a failed broadcast moves the session to `Failed` instead of reopening
//! `Active`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::chain::{Amount, ChainKind, TransactionId};
use crate::escrow::error::{EscrowError, EscrowResult, Transition};
use crate::vault::EncryptedBlob;

/// Opaque, immutable session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowState {
    Created,
    AwaitingDeposits,
    Active,
    Settled,
    Refunded,
    Failed,
}

impl EscrowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowState::Created => "created",
            EscrowState::AwaitingDeposits => "awaiting_deposits",
            EscrowState::Active => "active",
            EscrowState::Settled => "settled",
            EscrowState::Refunded => "refunded",
            EscrowState::Failed => "failed",
        }
    }
}

impl fmt::Display for EscrowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EscrowState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            EscrowState::Created,
            EscrowState::AwaitingDeposits,
            EscrowState::Active,
            EscrowState::Settled,
            EscrowState::Refunded,
            EscrowState::Failed,
        ]
        .into_iter()
        .find(|state| state.as_str() == s)
        .ok_or_else(|| format!("unknown escrow state '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Player {
    One,
    Two,
}

impl Player {
    pub const BOTH: [Player; 2] = [Player::One, Player::Two];
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Player::One => f.write_str("player1"),
            Player::Two => f.write_str("player2"),
        }
    }
}

/// The per-session escrow account. Only the ciphertext of its secret is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowIdentity {
    pub address: String,
    pub encrypted_secret: EncryptedBlob,
}

/// Why a session ended up in `Failed`, kept for operator resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub transition: Transition,
    pub from_state: EscrowState,
    pub reason: String,
    /// Winner that had been declared when a settlement broadcast failed.
    pub intended_winner: Option<String>,
    pub at: DateTime<Utc>,
}

/// One wagered game and its custody lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowSession {
    id: SessionId,
    chain: ChainKind,
    bet_amount: Amount,
    player1: String,
    player2: String,
    escrow_identity: EscrowIdentity,
    player1_deposited: bool,
    player2_deposited: bool,
    state: EscrowState,
    winner: Option<String>,
    observed_balance: Option<Amount>,
    tx_ids: Vec<TransactionId>,
    payout_recorded: bool,
    failure: Option<FailureRecord>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// Store version, bumped on every successful write.
    version: u64,
}

impl EscrowSession {
    /// A fresh session in `Created`.
    pub fn new(
        chain: ChainKind,
        bet_amount: Amount,
        player1: impl Into<String>,
        player2: impl Into<String>,
        escrow_identity: EscrowIdentity,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            chain,
            bet_amount,
            player1: player1.into(),
            player2: player2.into(),
            escrow_identity,
            player1_deposited: false,
            player2_deposited: false,
            state: EscrowState::Created,
            winner: None,
            observed_balance: None,
            tx_ids: Vec::new(),
            payout_recorded: false,
            failure: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn chain(&self) -> ChainKind {
        self.chain
    }

    pub fn bet_amount(&self) -> Amount {
        self.bet_amount
    }

    pub fn player1(&self) -> &str {
        &self.player1
    }

    pub fn player2(&self) -> &str {
        &self.player2
    }

    pub fn player_address(&self, player: Player) -> &str {
        match player {
            Player::One => &self.player1,
            Player::Two => &self.player2,
        }
    }

    pub fn escrow_identity(&self) -> &EscrowIdentity {
        &self.escrow_identity
    }

    pub fn escrow_address(&self) -> &str {
        &self.escrow_identity.address
    }

    pub fn has_deposited(&self, player: Player) -> bool {
        match player {
            Player::One => self.player1_deposited,
            Player::Two => self.player2_deposited,
        }
    }

    /// Players whose deposit has been confirmed, in player order.
    pub fn depositors(&self) -> Vec<Player> {
        Player::BOTH
            .into_iter()
            .filter(|p| self.has_deposited(*p))
            .collect()
    }

    pub fn state(&self) -> EscrowState {
        self.state
    }

    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    /// Last polled balance. Advisory only; payouts re-read the chain.
    pub fn observed_balance(&self) -> Option<Amount> {
        self.observed_balance
    }

    pub fn tx_ids(&self) -> &[TransactionId] {
        &self.tx_ids
    }

    /// Whether the settlement or refund transfers were accepted by the chain.
    pub fn payout_recorded(&self) -> bool {
        self.payout_recorded
    }

    pub fn failure(&self) -> Option<&FailureRecord> {
        self.failure.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Which player, if any, owns `address`.
    pub fn player_for(&self, address: &str) -> Option<Player> {
        let address = address.trim();
        if address.eq_ignore_ascii_case(&self.player1) {
            Some(Player::One)
        } else if address.eq_ignore_ascii_case(&self.player2) {
            Some(Player::Two)
        } else {
            None
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// `Created → AwaitingDeposits`, once the identity is stored encrypted.
    pub fn open_for_deposits(&mut self) -> EscrowResult<()> {
        if self.state != EscrowState::Created {
            return Err(EscrowError::NotActive(self.state));
        }
        self.state = EscrowState::AwaitingDeposits;
        self.touch();
        Ok(())
    }

    pub fn record_balance(&mut self, balance: Amount) {
        self.observed_balance = Some(balance);
        self.touch();
    }

    /// Mark `player` as deposited. Flags only ever go from false to true.
    ///
    /// Returns `true` when this call activated the session.
    pub fn record_deposit(&mut self, player: Player) -> EscrowResult<bool> {
        if self.state != EscrowState::AwaitingDeposits {
            return Err(EscrowError::NotActive(self.state));
        }

        match player {
            Player::One => self.player1_deposited = true,
            Player::Two => self.player2_deposited = true,
        }
        self.touch();

        if self.player1_deposited && self.player2_deposited {
            self.state = EscrowState::Active;
            return Ok(true);
        }
        Ok(false)
    }

    /// `Active → Settled` with `winner` declared.
    ///
    /// Returns the canonical player address so payouts go to the registered
    /// spelling rather than the caller's.
    pub fn settle(&mut self, winner: &str) -> EscrowResult<String> {
        match self.state {
            EscrowState::Active => {}
            EscrowState::Settled => return Err(EscrowError::AlreadySettled),
            other => return Err(EscrowError::NotActive(other)),
        }

        let player = self
            .player_for(winner)
            .ok_or_else(|| EscrowError::InvalidWinner(winner.to_string()))?;
        let address = self.player_address(player).to_string();

        self.winner = Some(address.clone());
        self.state = EscrowState::Settled;
        self.touch();
        Ok(address)
    }

    /// `AwaitingDeposits → Refunded`.
    pub fn refund(&mut self) -> EscrowResult<()> {
        if self.state != EscrowState::AwaitingDeposits {
            return Err(EscrowError::NotActive(self.state));
        }
        self.state = EscrowState::Refunded;
        self.touch();
        Ok(())
    }

    /// Record the transactions that completed a settlement or refund.
    pub fn record_payout(&mut self, tx_ids: Vec<TransactionId>) -> EscrowResult<()> {
        match self.state {
            EscrowState::Settled | EscrowState::Refunded if !self.payout_recorded => {
                self.tx_ids.extend(tx_ids);
                self.payout_recorded = true;
                self.touch();
                Ok(())
            }
            EscrowState::Settled => Err(EscrowError::AlreadySettled),
            other => Err(EscrowError::NotActive(other)),
        }
    }

    /// Move to `Failed`, keeping any transactions already issued.
    pub fn fail(
        &mut self,
        transition: Transition,
        reason: impl Into<String>,
        issued: Vec<TransactionId>,
    ) -> EscrowResult<()> {
        let from_state = self.state;
        match from_state {
            EscrowState::Created | EscrowState::AwaitingDeposits | EscrowState::Active => {}
            EscrowState::Settled | EscrowState::Refunded if !self.payout_recorded => {}
            EscrowState::Settled => return Err(EscrowError::AlreadySettled),
            other => return Err(EscrowError::NotActive(other)),
        }

        self.failure = Some(FailureRecord {
            transition,
            from_state,
            reason: reason.into(),
            intended_winner: self.winner.take(),
            at: Utc::now(),
        });
        self.tx_ids.extend(issued);
        self.state = EscrowState::Failed;
        self.touch();
        Ok(())
    }
}
