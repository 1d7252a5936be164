//! Reference adapters for EVM chains.
//!
//! `EvmDirectAdapter` pays the winner straight from the escrow account.
//! `EvmAttestationAdapter` leaves funds to a payout contract and submits the
//! server's signed attestation to `payout(address,bytes)`.

use alloy::primitives::{keccak256, Address, Bytes, TxHash, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::blockchain::transaction::{PAYOUT_GAS_LIMIT, TRANSFER_GAS_LIMIT};
use crate::blockchain::{BlockchainClient, TxBuilder, Wallet};
use crate::chain::adapter::{
    AuthorizedContractAdapter, ChainAdapter, ChainError, GeneratedIdentity, SignedTransaction,
    TransactionId,
};
use crate::chain::registry::AdapterRegistry;
use crate::chain::types::{Amount, ChainKind, PayoutMode};
use crate::config::schema::{ChainConfig, EngineConfig};

sol! {
    /// Releases the pooled stake to `winner` once `signature` recovers to the oracle.
    function payout(address winner, bytes signature) external;
}

pub(crate) fn parse_address(address: &str) -> Result<Address, ChainError> {
    address
        .trim()
        .parse::<Address>()
        .map_err(|_| ChainError::InvalidAddress(address.to_string()))
}

fn to_amount(value: U256) -> Amount {
    if value > U256::from(u128::MAX) {
        Amount::new(u128::MAX)
    } else {
        Amount::new(value.to::<u128>())
    }
}

fn tx_id(hash: TxHash) -> TransactionId {
    TransactionId(hash.to_string())
}

/// Shared account plumbing for both EVM variants.
#[derive(Debug, Clone)]
struct EvmAccounts {
    chain: ChainKind,
    builder: TxBuilder,
    minimum_reserve: Amount,
    fee_override: Option<Amount>,
}

impl EvmAccounts {
    fn new(chain: ChainKind, client: BlockchainClient, config: &ChainConfig) -> Self {
        Self {
            chain,
            builder: TxBuilder::new(client),
            minimum_reserve: config.minimum_reserve,
            fee_override: config.fee_reserve,
        }
    }

    fn client(&self) -> &BlockchainClient {
        self.builder.client()
    }

    async fn fee_reserve(&self) -> Result<Amount, ChainError> {
        if let Some(fee) = self.fee_override {
            return Ok(fee);
        }
        let quote = self.builder.quote(TRANSFER_GAS_LIMIT).await?;
        Ok(Amount::new(quote.fee()))
    }

    fn generate_identity(&self) -> GeneratedIdentity {
        let signer = PrivateKeySigner::random();
        GeneratedIdentity {
            address: signer.address().to_string(),
            secret: Zeroizing::new(signer.to_bytes().to_vec()),
        }
    }

    async fn get_balance(&self, address: &str) -> Result<Amount, ChainError> {
        let address = parse_address(address)?;
        let balance = self.client().get_balance(address).await?;
        Ok(to_amount(balance))
    }

    async fn build_transfer(
        &self,
        from_secret: &[u8],
        to: &str,
        amount: Amount,
    ) -> Result<SignedTransaction, ChainError> {
        let recipient = parse_address(to)?;
        let signer = PrivateKeySigner::from_slice(from_secret)
            .map_err(|e| ChainError::InvalidSecret(e.to_string()))?;
        let from = signer.address();

        let mut quote = self.builder.quote(TRANSFER_GAS_LIMIT).await?;
        if let Some(fee) = self.fee_override {
            // Never spend more on gas than was reserved for it.
            quote.gas_price = quote.gas_price.min(fee.value() / TRANSFER_GAS_LIMIT as u128);
        }

        let balance = to_amount(self.client().get_balance(from).await?);
        let required = amount
            .checked_add(Amount::new(quote.fee()))
            .unwrap_or(Amount::new(u128::MAX));
        if required > balance {
            return Err(ChainError::InsufficientBalance {
                available: balance,
                required,
            });
        }

        let nonce = self.client().get_transaction_count(from).await?;
        let signed = self
            .builder
            .sign(&signer, nonce, recipient, U256::from(amount.value()), Bytes::new(), quote)
            .await?;

        Ok(SignedTransaction {
            chain: self.chain,
            tx_id: tx_id(signed.hash),
            from: from.to_string(),
            to: recipient.to_string(),
            amount,
            raw: signed.raw,
        })
    }

    async fn broadcast(&self, tx: &SignedTransaction) -> Result<TransactionId, ChainError> {
        let expected: TxHash = tx
            .tx_id
            .0
            .parse()
            .map_err(|_| ChainError::BroadcastRejected(format!("malformed tx id {}", tx.tx_id)))?;
        let hash = self.client().send_raw_transaction(&tx.raw, expected).await?;
        tracing::info!(chain = %self.chain, tx_hash = %hash, to = %tx.to, amount = %tx.amount, "Transaction broadcast");
        Ok(tx_id(hash))
    }
}

/// Custodial adapter: the escrow account signs the payout itself.
#[derive(Debug, Clone)]
pub struct EvmDirectAdapter {
    accounts: EvmAccounts,
}

impl EvmDirectAdapter {
    pub fn new(client: BlockchainClient, config: &ChainConfig) -> Self {
        Self {
            accounts: EvmAccounts::new(config.chain, client, config),
        }
    }
}

#[async_trait]
impl ChainAdapter for EvmDirectAdapter {
    fn chain(&self) -> ChainKind {
        self.accounts.chain
    }

    fn validate_address(&self, address: &str) -> Result<(), ChainError> {
        parse_address(address).map(|_| ())
    }

    fn minimum_reserve(&self) -> Amount {
        self.accounts.minimum_reserve
    }

    async fn fee_reserve(&self) -> Result<Amount, ChainError> {
        self.accounts.fee_reserve().await
    }

    async fn generate_identity(&self) -> Result<GeneratedIdentity, ChainError> {
        Ok(self.accounts.generate_identity())
    }

    async fn get_balance(&self, address: &str) -> Result<Amount, ChainError> {
        self.accounts.get_balance(address).await
    }

    async fn build_transfer(
        &self,
        from_secret: &[u8],
        to: &str,
        amount: Amount,
    ) -> Result<SignedTransaction, ChainError> {
        self.accounts.build_transfer(from_secret, to, amount).await
    }

    async fn broadcast(&self, tx: &SignedTransaction) -> Result<TransactionId, ChainError> {
        self.accounts.broadcast(tx).await
    }
}

/// Contract-settled adapter: the server attests the winner, the contract pays.
#[derive(Debug, Clone)]
pub struct EvmAttestationAdapter {
    accounts: EvmAccounts,
    server: Wallet,
    contract: Address,
    contract_display: String,
}

impl EvmAttestationAdapter {
    pub fn new(client: BlockchainClient, config: &ChainConfig, server: Wallet) -> Result<Self, ChainError> {
        let raw = config.contract_address.as_deref().ok_or_else(|| ChainError::Unsupported {
            chain: config.chain,
            operation: "contract payout without contract_address".to_string(),
        })?;
        let contract = parse_address(raw)?;
        Ok(Self {
            accounts: EvmAccounts::new(config.chain, client, config),
            server,
            contract,
            contract_display: contract.to_string(),
        })
    }
}

/// keccak256(winner ‖ contract), the digest the payout contract recovers against.
pub fn attestation_digest(winner: Address, contract: Address) -> [u8; 32] {
    let mut packed = Vec::with_capacity(40);
    packed.extend_from_slice(winner.as_slice());
    packed.extend_from_slice(contract.as_slice());
    keccak256(&packed).0
}

#[async_trait]
impl ChainAdapter for EvmAttestationAdapter {
    fn chain(&self) -> ChainKind {
        self.accounts.chain
    }

    fn validate_address(&self, address: &str) -> Result<(), ChainError> {
        parse_address(address).map(|_| ())
    }

    fn minimum_reserve(&self) -> Amount {
        self.accounts.minimum_reserve
    }

    async fn fee_reserve(&self) -> Result<Amount, ChainError> {
        self.accounts.fee_reserve().await
    }

    async fn generate_identity(&self) -> Result<GeneratedIdentity, ChainError> {
        Ok(self.accounts.generate_identity())
    }

    async fn get_balance(&self, address: &str) -> Result<Amount, ChainError> {
        self.accounts.get_balance(address).await
    }

    async fn build_transfer(
        &self,
        from_secret: &[u8],
        to: &str,
        amount: Amount,
    ) -> Result<SignedTransaction, ChainError> {
        self.accounts.build_transfer(from_secret, to, amount).await
    }

    async fn broadcast(&self, tx: &SignedTransaction) -> Result<TransactionId, ChainError> {
        self.accounts.broadcast(tx).await
    }
}

#[async_trait]
impl AuthorizedContractAdapter for EvmAttestationAdapter {
    fn contract_address(&self) -> &str {
        &self.contract_display
    }

    fn attestation_message(&self, winner: &str) -> Result<Vec<u8>, ChainError> {
        let winner = parse_address(winner)?;
        Ok(attestation_digest(winner, self.contract).to_vec())
    }

    async fn submit_payout(&self, winner: &str, signature: &[u8]) -> Result<TransactionId, ChainError> {
        let winner = parse_address(winner)?;
        let call = payoutCall {
            winner,
            signature: Bytes::copy_from_slice(signature),
        };

        let client = self.accounts.client();
        let quote = self.accounts.builder.quote(PAYOUT_GAS_LIMIT).await?;
        let chain_nonce = client.get_transaction_count(self.server.address()).await?;
        let nonce = self.server.reserve_nonce(chain_nonce);

        let signed = self
            .accounts
            .builder
            .sign(
                self.server.signer(),
                nonce,
                self.contract,
                U256::ZERO,
                Bytes::from(call.abi_encode()),
                quote,
            )
            .await?;

        let hash = client.send_raw_transaction(&signed.raw, signed.hash).await?;
        tracing::info!(
            chain = %self.accounts.chain,
            contract = %self.contract,
            winner = %winner,
            tx_hash = %hash,
            "Payout attestation submitted"
        );
        Ok(tx_id(hash))
    }
}

/// Build a registry with the built-in adapter for every configured chain.
pub async fn build_registry(config: &EngineConfig) -> Result<AdapterRegistry, ChainError> {
    let mut registry = AdapterRegistry::new();

    for chain_config in &config.chains {
        if !chain_config.chain.is_evm() {
            return Err(ChainError::Unsupported {
                chain: chain_config.chain,
                operation: "built-in adapter".to_string(),
            });
        }

        let client = BlockchainClient::new(chain_config.clone()).await?;
        match chain_config.payout_mode() {
            PayoutMode::DirectTransfer => {
                registry.register_direct(Arc::new(EvmDirectAdapter::new(client, chain_config)));
            }
            PayoutMode::AuthorizedContract => {
                let server = Wallet::from_env(&chain_config.attestor_key_env, chain_config.chain_id)?;
                let adapter = EvmAttestationAdapter::new(client, chain_config, server.clone())?;
                registry.register_authorized(Arc::new(adapter), Arc::new(server));
            }
        }
    }

    Ok(registry)
}
