//! Adapter registry keyed by chain.

use std::collections::HashMap;
use std::sync::Arc;

use crate::chain::adapter::{AttestationSigner, AuthorizedContractAdapter, ChainAdapter};
use crate::chain::types::{ChainKind, PayoutMode};

/// How a registered chain releases a settlement.
#[derive(Clone)]
pub enum PayoutRoute {
    /// Custodial transfer signed with the escrow identity.
    Direct,
    /// Attestation signed by the server and verified by a contract.
    Authorized {
        contract: Arc<dyn AuthorizedContractAdapter>,
        attestor: Arc<dyn AttestationSigner>,
    },
}

/// A chain adapter together with its payout route.
#[derive(Clone)]
pub struct RegisteredAdapter {
    pub adapter: Arc<dyn ChainAdapter>,
    pub route: PayoutRoute,
}

impl RegisteredAdapter {
    pub fn mode(&self) -> PayoutMode {
        match self.route {
            PayoutRoute::Direct => PayoutMode::DirectTransfer,
            PayoutRoute::Authorized { .. } => PayoutMode::AuthorizedContract,
        }
    }
}

impl std::fmt::Debug for RegisteredAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredAdapter")
            .field("chain", &self.adapter.chain())
            .field("mode", &self.mode())
            .finish()
    }
}

/// One adapter per chain.
#[derive(Clone, Default, Debug)]
pub struct AdapterRegistry {
    adapters: HashMap<ChainKind, RegisteredAdapter>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custodial-transfer adapter. Replaces any previous entry for its chain.
    pub fn register_direct(&mut self, adapter: Arc<dyn ChainAdapter>) -> &mut Self {
        let chain = adapter.chain();
        tracing::info!(chain = %chain, mode = %PayoutMode::DirectTransfer, "Chain adapter registered");
        self.adapters.insert(
            chain,
            RegisteredAdapter {
                adapter,
                route: PayoutRoute::Direct,
            },
        );
        self
    }

    /// Register a contract-settled adapter and the signer that attests winners for it.
    pub fn register_authorized<A>(
        &mut self,
        adapter: Arc<A>,
        attestor: Arc<dyn AttestationSigner>,
    ) -> &mut Self
    where
        A: AuthorizedContractAdapter + 'static,
    {
        let chain = adapter.chain();
        tracing::info!(
            chain = %chain,
            mode = %PayoutMode::AuthorizedContract,
            contract = %adapter.contract_address(),
            attestor = %attestor.signer_address(),
            "Chain adapter registered"
        );
        let base: Arc<dyn ChainAdapter> = adapter.clone();
        let contract: Arc<dyn AuthorizedContractAdapter> = adapter;
        self.adapters.insert(
            chain,
            RegisteredAdapter {
                adapter: base,
                route: PayoutRoute::Authorized { contract, attestor },
            },
        );
        self
    }

    pub fn get(&self, chain: ChainKind) -> Option<&RegisteredAdapter> {
        self.adapters.get(&chain)
    }

    pub fn chains(&self) -> Vec<ChainKind> {
        let mut chains: Vec<_> = self.adapters.keys().copied().collect();
        chains.sort_by_key(|c| c.ticker());
        chains
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
