//! Shared application state injected into all Axum handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;

use crate::chain::ChainClient;
use crate::domain::ChainId;
use crate::error::IndexerError;
use crate::indexer::IndexerStatus;
use crate::persistence::LedgerReader;

/// A configured network as seen by the API.
#[derive(Debug, Clone)]
pub struct ChainHandle {
    /// EVM chain id.
    pub chain_id: u64,
    /// Live chain access.
    pub client: Arc<dyn ChainClient>,
    /// Engine status feed.
    pub status: watch::Receiver<IndexerStatus>,
}

/// Configured networks keyed by partition name.
#[derive(Debug, Clone, Default)]
pub struct ChainDirectory {
    chains: BTreeMap<ChainId, ChainHandle>,
}

impl ChainDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a network.
    pub fn insert(&mut self, chain: ChainId, handle: ChainHandle) {
        self.chains.insert(chain, handle);
    }

    /// Looks up a network.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::ChainNotConfigured`] if it is unknown.
    pub fn get(&self, chain: &ChainId) -> Result<&ChainHandle, IndexerError> {
        self.chains
            .get(chain)
            .ok_or_else(|| IndexerError::ChainNotConfigured(chain.to_string()))
    }

    /// Iterates networks in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&ChainId, &ChainHandle)> {
        self.chains.iter()
    }
}

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Ledger read queries.
    pub ledger: Arc<dyn LedgerReader>,
    /// Configured networks.
    pub chains: ChainDirectory,
    /// Chain used when a request names none.
    pub default_chain: ChainId,
}

impl AppState {
    /// Resolves the request's `chain` parameter, defaulting when absent.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::ChainNotConfigured`] for unknown networks.
    pub fn resolve_chain(&self, requested: Option<&ChainId>) -> Result<ChainId, IndexerError> {
        let chain = requested.unwrap_or(&self.default_chain);
        self.chains.get(chain)?;
        Ok(chain.clone())
    }
}
