//! Shared utilities for integration testing.
//!
//! `MockChain` is an in-memory ledger implementing both adapter traits, with
//! programmable balances and fees, recorded submissions and injectable faults.

#![allow(dead_code)]

use async_trait::async_trait;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zeroize::Zeroizing;

use wager_escrow::chain::{
    AdapterRegistry, Amount, AttestationSigner, AuthorizedContractAdapter, ChainAdapter, ChainError, ChainKind,
    GeneratedIdentity, SignedTransaction, TransactionId,
};
use wager_escrow::config::{DepositAttribution, RetryConfig};
use wager_escrow::escrow::{EscrowCoordinator, EscrowSession, EscrowState, MemorySessionStore, SessionStore};
use wager_escrow::vault::{HostKey, StaticSecretProvider};

pub const PLAYER1: &str = "mock1alice";
pub const PLAYER2: &str = "mock1bob";
pub const CONTRACT: &str = "mock1contract";
pub const ORACLE: &str = "mock1oracle";

pub fn host_key() -> HostKey {
    HostKey::from_bytes(&[7u8; 32])
}

/// Retries fast enough for tests.
pub fn fast_retries() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 5,
    }
}

/// A payout call made through the contract route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractPayout {
    pub winner: String,
    pub signature: Vec<u8>,
}

#[derive(Default)]
struct Ledger {
    balances: HashMap<String, Amount>,
    secrets: HashMap<String, Vec<u8>>,
    fee: Amount,
    reserve: Amount,
    broadcasts: Vec<SignedTransaction>,
    payouts: Vec<ContractPayout>,
    balance_failures: u32,
    balance_reads: u32,
    reject_broadcasts: Option<String>,
    reject_payouts: Option<String>,
    scheduled_deposits: Vec<(u32, String, Amount)>,
    next_tx: u64,
}

pub struct MockChain {
    kind: ChainKind,
    ledger: Mutex<Ledger>,
    broadcast_delay: Option<Duration>,
}

impl MockChain {
    pub fn new(kind: ChainKind) -> Self {
        Self {
            kind,
            ledger: Mutex::new(Ledger::default()),
            broadcast_delay: None,
        }
    }

    pub fn with_fee(self, fee: u128) -> Self {
        self.ledger.lock().unwrap().fee = Amount::new(fee);
        self
    }

    pub fn with_reserve(self, reserve: u128) -> Self {
        self.ledger.lock().unwrap().reserve = Amount::new(reserve);
        self
    }

    pub fn with_broadcast_delay(mut self, delay: Duration) -> Self {
        self.broadcast_delay = Some(delay);
        self
    }

    /// Credit `amount` to `address`, as a player's deposit would.
    pub fn deposit(&self, address: &str, amount: u128) {
        let mut ledger = self.ledger.lock().unwrap();
        let balance = ledger.balances.entry(address.to_string()).or_insert(Amount::ZERO);
        *balance = balance.checked_add(Amount::new(amount)).unwrap();
    }

    /// Credit `amount` to `address` just before balance read number `read`
    /// (counted from the first read this chain ever served) returns.
    pub fn deposit_on_read(&self, read: u32, address: &str, amount: u128) {
        self.ledger
            .lock()
            .unwrap()
            .scheduled_deposits
            .push((read, address.to_string(), Amount::new(amount)));
    }

    pub fn set_balance(&self, address: &str, amount: u128) {
        self.ledger
            .lock()
            .unwrap()
            .balances
            .insert(address.to_string(), Amount::new(amount));
    }

    pub fn balance_of(&self, address: &str) -> Amount {
        self.ledger
            .lock()
            .unwrap()
            .balances
            .get(address)
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    /// Make the next `count` balance reads fail as unavailable.
    pub fn fail_balance_reads(&self, count: u32) {
        self.ledger.lock().unwrap().balance_failures = count;
    }

    pub fn balance_reads(&self) -> u32 {
        self.ledger.lock().unwrap().balance_reads
    }

    pub fn reject_broadcasts(&self, reason: &str) {
        self.ledger.lock().unwrap().reject_broadcasts = Some(reason.to_string());
    }

    /// Reject contract payout calls while plain broadcasts still go through.
    pub fn reject_payouts(&self, reason: &str) {
        self.ledger.lock().unwrap().reject_payouts = Some(reason.to_string());
    }

    pub fn broadcasts(&self) -> Vec<SignedTransaction> {
        self.ledger.lock().unwrap().broadcasts.clone()
    }

    pub fn payouts(&self) -> Vec<ContractPayout> {
        self.ledger.lock().unwrap().payouts.clone()
    }

    /// Plaintext secret the mock generated for `address`.
    pub fn secret_for(&self, address: &str) -> Option<Vec<u8>> {
        self.ledger.lock().unwrap().secrets.get(address).cloned()
    }

    fn address_for(secret: &[u8]) -> String {
        format!("mock1escrow{}", hex::encode(&secret[..8]))
    }

    fn next_tx_id(ledger: &mut Ledger) -> TransactionId {
        ledger.next_tx += 1;
        TransactionId(format!("mocktx{:04}", ledger.next_tx))
    }
}

#[async_trait]
impl ChainAdapter for MockChain {
    fn chain(&self) -> ChainKind {
        self.kind
    }

    fn validate_address(&self, address: &str) -> Result<(), ChainError> {
        let valid = address.len() >= 8
            && address.to_ascii_lowercase().starts_with("mock1")
            && address.chars().all(|c| c.is_ascii_alphanumeric());
        if valid {
            Ok(())
        } else {
            Err(ChainError::InvalidAddress(address.to_string()))
        }
    }

    fn minimum_reserve(&self) -> Amount {
        self.ledger.lock().unwrap().reserve
    }

    async fn fee_reserve(&self) -> Result<Amount, ChainError> {
        Ok(self.ledger.lock().unwrap().fee)
    }

    async fn generate_identity(&self) -> Result<GeneratedIdentity, ChainError> {
        let mut secret = Zeroizing::new(vec![0u8; 32]);
        rand::thread_rng().fill_bytes(&mut secret);
        let address = Self::address_for(&secret);
        self.ledger
            .lock()
            .unwrap()
            .secrets
            .insert(address.clone(), secret.to_vec());
        Ok(GeneratedIdentity { address, secret })
    }

    async fn get_balance(&self, address: &str) -> Result<Amount, ChainError> {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.balance_reads += 1;
        let read = ledger.balance_reads;
        let due: Vec<(String, Amount)> = ledger
            .scheduled_deposits
            .iter()
            .filter(|(at, _, _)| *at == read)
            .map(|(_, to, amount)| (to.clone(), *amount))
            .collect();
        for (to, amount) in due {
            let balance = ledger.balances.entry(to).or_insert(Amount::ZERO);
            *balance = balance.checked_add(amount).unwrap();
        }
        if ledger.balance_failures > 0 {
            ledger.balance_failures -= 1;
            return Err(ChainError::Unavailable("node timed out".to_string()));
        }
        Ok(ledger.balances.get(address).copied().unwrap_or(Amount::ZERO))
    }

    async fn build_transfer(
        &self,
        from_secret: &[u8],
        to: &str,
        amount: Amount,
    ) -> Result<SignedTransaction, ChainError> {
        if from_secret.len() != 32 {
            return Err(ChainError::InvalidSecret("expected 32 bytes".to_string()));
        }
        self.validate_address(to)?;
        let mut ledger = self.ledger.lock().unwrap();
        let tx_id = Self::next_tx_id(&mut ledger);
        Ok(SignedTransaction {
            chain: self.kind,
            tx_id,
            from: Self::address_for(from_secret),
            to: to.to_string(),
            amount,
            raw: Vec::new(),
        })
    }

    async fn broadcast(&self, tx: &SignedTransaction) -> Result<TransactionId, ChainError> {
        if let Some(delay) = self.broadcast_delay {
            tokio::time::sleep(delay).await;
        }

        let mut ledger = self.ledger.lock().unwrap();
        if let Some(reason) = ledger.reject_broadcasts.clone() {
            return Err(ChainError::BroadcastRejected(reason));
        }

        let fee = ledger.fee;
        let available = ledger.balances.get(&tx.from).copied().unwrap_or(Amount::ZERO);
        let spent = tx.amount.checked_add(fee).unwrap();
        let remaining = available
            .checked_sub(spent)
            .ok_or_else(|| ChainError::BroadcastRejected("insufficient funds".to_string()))?;

        ledger.balances.insert(tx.from.clone(), remaining);
        let credited = ledger
            .balances
            .get(&tx.to)
            .copied()
            .unwrap_or(Amount::ZERO)
            .checked_add(tx.amount)
            .unwrap();
        ledger.balances.insert(tx.to.clone(), credited);
        ledger.broadcasts.push(tx.clone());
        Ok(tx.tx_id.clone())
    }
}

#[async_trait]
impl AuthorizedContractAdapter for MockChain {
    fn contract_address(&self) -> &str {
        CONTRACT
    }

    fn attestation_message(&self, winner: &str) -> Result<Vec<u8>, ChainError> {
        self.validate_address(winner)?;
        Ok(format!("{}|{}", winner, CONTRACT).into_bytes())
    }

    async fn submit_payout(&self, winner: &str, signature: &[u8]) -> Result<TransactionId, ChainError> {
        let mut ledger = self.ledger.lock().unwrap();
        if let Some(reason) = ledger.reject_broadcasts.clone().or_else(|| ledger.reject_payouts.clone()) {
            return Err(ChainError::BroadcastRejected(reason));
        }
        ledger.payouts.push(ContractPayout {
            winner: winner.to_string(),
            signature: signature.to_vec(),
        });
        Ok(Self::next_tx_id(&mut ledger))
    }
}

/// Signs by prefixing the message, so tests can check what was attested.
pub struct MockAttestor;

impl MockAttestor {
    pub fn expected_signature(winner: &str) -> Vec<u8> {
        let mut signature = b"signed:".to_vec();
        signature.extend_from_slice(format!("{}|{}", winner, CONTRACT).as_bytes());
        signature
    }
}

#[async_trait]
impl AttestationSigner for MockAttestor {
    fn signer_address(&self) -> String {
        ORACLE.to_string()
    }

    async fn sign_attestation(&self, message: &[u8]) -> Result<Vec<u8>, ChainError> {
        let mut signature = b"signed:".to_vec();
        signature.extend_from_slice(message);
        Ok(signature)
    }
}

pub struct Harness {
    pub chain: Arc<MockChain>,
    pub store: Arc<MemorySessionStore>,
    pub coordinator: Arc<EscrowCoordinator>,
}

impl Harness {
    /// Coordinator over the same chain and store, with a different host key.
    pub fn with_key(&self, registry: AdapterRegistry, key: HostKey) -> EscrowCoordinator {
        let store: Arc<dyn SessionStore> = self.store.clone();
        EscrowCoordinator::new(registry, store, Arc::new(StaticSecretProvider::new(key)))
            .with_retries(fast_retries())
    }

    pub fn direct_registry(&self) -> AdapterRegistry {
        let mut registry = AdapterRegistry::new();
        registry.register_direct(self.chain.clone());
        registry
    }

    /// Create a session between `PLAYER1` and `PLAYER2`.
    pub async fn create(&self, bet: u128) -> EscrowSession {
        self.coordinator
            .create_escrow(self.chain.chain(), Amount::new(bet), PLAYER1, PLAYER2)
            .await
            .unwrap()
    }

    /// Create a session and fund it from both players until it is active.
    pub async fn create_active(&self, bet: u128) -> EscrowSession {
        let session = self.create(bet).await;
        self.chain.deposit(session.escrow_address(), bet * 2);
        let active = self.coordinator.check_deposits(session.id()).await.unwrap();
        assert_eq!(active.state(), EscrowState::Active);
        active
    }
}

fn build(
    chain: MockChain,
    registry: impl FnOnce(&Arc<MockChain>) -> AdapterRegistry,
    attribution: DepositAttribution,
) -> Harness {
    let chain = Arc::new(chain);
    let store = Arc::new(MemorySessionStore::new());
    let shared: Arc<dyn SessionStore> = store.clone();
    let secrets = Arc::new(StaticSecretProvider::new(host_key()));
    let coordinator = EscrowCoordinator::new(registry(&chain), shared, secrets)
        .with_retries(fast_retries())
        .with_attribution(attribution);

    Harness {
        chain,
        store,
        coordinator: Arc::new(coordinator),
    }
}

/// Harness whose chain pays out by custodial transfer.
pub fn direct(chain: MockChain) -> Harness {
    build(
        chain,
        |chain| {
            let mut registry = AdapterRegistry::new();
            registry.register_direct(chain.clone());
            registry
        },
        DepositAttribution::BalanceThreshold,
    )
}

/// Direct harness where deposits are only confirmed by an operator.
pub fn manual(chain: MockChain) -> Harness {
    build(
        chain,
        |chain| {
            let mut registry = AdapterRegistry::new();
            registry.register_direct(chain.clone());
            registry
        },
        DepositAttribution::ManualConfirmation,
    )
}

/// Harness whose chain pays out through the contract route.
pub fn authorized(chain: MockChain) -> Harness {
    build(
        chain,
        |chain| {
            let mut registry = AdapterRegistry::new();
            registry.register_authorized(chain.clone(), Arc::new(MockAttestor));
            registry
        },
        DepositAttribution::BalanceThreshold,
    )
}
