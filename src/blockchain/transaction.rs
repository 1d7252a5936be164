//! Gas quoting and offline transaction signing.
//!
//! # Responsibilities
//! - Quote gas price with the configured multiplier and ceiling
//! - Build legacy transactions and sign them without broadcasting
//! - Expose the transaction hash before submission

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;

use crate::blockchain::client::BlockchainClient;
use crate::blockchain::types::{BlockchainError, BlockchainResult};

/// Gas used by a plain value transfer.
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

/// Gas budget for a contract payout call.
pub const PAYOUT_GAS_LIMIT: u64 = 150_000;

/// Gas price and the resulting worst-case fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasQuote {
    pub gas_price: u128,
    pub gas_limit: u64,
}

impl GasQuote {
    pub fn fee(&self) -> u128 {
        self.gas_price.saturating_mul(self.gas_limit as u128)
    }
}

/// A signed transaction that has not been broadcast.
#[derive(Debug, Clone)]
pub struct SignedRaw {
    pub hash: TxHash,
    pub raw: Vec<u8>,
}

/// Builds and signs transactions against one chain.
#[derive(Debug, Clone)]
pub struct TxBuilder {
    client: BlockchainClient,
}

impl TxBuilder {
    pub fn new(client: BlockchainClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &BlockchainClient {
        &self.client
    }

    /// Quote the gas price for a transaction with `gas_limit`.
    pub async fn quote(&self, gas_limit: u64) -> BlockchainResult<GasQuote> {
        let gas_price = self.client.get_gas_price().await?;
        let gas_price_gwei = gas_price / 1_000_000_000;

        let config = self.client.config();
        if gas_price_gwei > config.max_gas_price_gwei as u128 {
            return Err(BlockchainError::GasPriceTooHigh {
                current_gwei: gas_price_gwei as u64,
                max_gwei: config.max_gas_price_gwei,
            });
        }

        Ok(GasQuote {
            gas_price: apply_multiplier(gas_price, config.gas_price_multiplier),
            gas_limit,
        })
    }

    /// Sign a transaction from `signer` without submitting it.
    pub async fn sign(
        &self,
        signer: &PrivateKeySigner,
        nonce: u64,
        to: Address,
        value: U256,
        data: Bytes,
        quote: GasQuote,
    ) -> BlockchainResult<SignedRaw> {
        let tx = TransactionRequest::default()
            .with_from(signer.address())
            .with_to(to)
            .with_value(value)
            .with_input(data)
            .with_nonce(nonce)
            .with_gas_price(quote.gas_price)
            .with_gas_limit(quote.gas_limit)
            .with_chain_id(self.client.config().chain_id);

        let wallet = EthereumWallet::from(signer.clone());
        let envelope = tx
            .build(&wallet)
            .await
            .map_err(|e| BlockchainError::Wallet(format!("Transaction signing failed: {}", e)))?;

        Ok(SignedRaw {
            hash: *envelope.tx_hash(),
            raw: envelope.encoded_2718(),
        })
    }
}

/// Apply the safety multiplier to a gas price. Multipliers below 1.0 are ignored.
pub fn apply_multiplier(gas_price: u128, multiplier: f64) -> u128 {
    if !multiplier.is_finite() || multiplier <= 1.0 {
        return gas_price;
    }
    (gas_price as f64 * multiplier) as u128
}
