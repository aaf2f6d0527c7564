//! Chain, indexer status and transaction DTOs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::chain::ReceiptSummary;
use crate::indexer::IndexerStatus;

/// Live engine status.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IndexerStatusDto {
    /// `uninitialized`, `catching_up`, `idle` or `stopped`.
    pub state: String,
    /// Last committed block.
    pub last_processed: Option<u64>,
    /// Latest head the engine saw.
    pub chain_head: Option<u64>,
    /// Failed iterations in a row.
    pub consecutive_failures: u32,
    /// Most recent failure message.
    pub last_error: Option<String>,
}

impl From<&IndexerStatus> for IndexerStatusDto {
    fn from(status: &IndexerStatus) -> Self {
        Self {
            state: status.state.to_string(),
            last_processed: status.last_processed,
            chain_head: status.chain_head,
            consecutive_failures: status.consecutive_failures,
            last_error: status.last_error.clone(),
        }
    }
}

/// One configured network for `GET /chains`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChainDto {
    /// Network name.
    pub chain: String,
    /// EVM chain id.
    pub chain_id: u64,
    /// Live engine status.
    pub indexer: IndexerStatusDto,
}

/// Response body for `GET /chains`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChainListResponse {
    /// Configured networks.
    pub chains: Vec<ChainDto>,
}

/// Response body for `GET /chains/{chain}/status`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChainStatusResponse {
    /// Network name.
    pub chain: String,
    /// EVM chain id.
    pub chain_id: u64,
    /// Persisted cursor.
    pub last_indexed_block: Option<u64>,
    /// Time the cursor last moved.
    pub cursor_updated_at: Option<DateTime<Utc>>,
    /// Live engine status.
    pub indexer: IndexerStatusDto,
    /// Current gas price in wei, as a decimal string.
    pub gas_price_wei: String,
}

/// Response body for `GET /transactions/{hash}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionResponse {
    /// Network name.
    pub chain: String,
    /// Transaction hash.
    pub tx_hash: String,
    /// Including block.
    pub block_number: Option<u64>,
    /// Execution succeeded.
    pub success: bool,
    /// Gas consumed.
    pub gas_used: u64,
    /// Effective gas price in wei, as a decimal string.
    pub effective_gas_price: String,
}

impl TransactionResponse {
    /// Builds the response from a receipt summary.
    #[must_use]
    pub fn new(chain: String, receipt: ReceiptSummary) -> Self {
        Self {
            chain,
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            success: receipt.success,
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price.to_string(),
        }
    }
}
