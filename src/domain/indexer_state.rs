//! Per-chain ingestion cursor.

use chrono::{DateTime, Utc};

use super::ChainId;

/// Persisted progress of one chain's indexer.
///
/// `last_block_number` only ever moves forward and is the single source of
/// truth for where the next poll resumes. `is_syncing` is written `false`
/// after each batch but is never set beforehand, so it carries no crash
/// information; recovery relies on batch atomicity alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerState {
    /// Chain partition.
    pub chain: ChainId,
    /// Last block whose events are fully applied.
    pub last_block_number: u64,
    /// Legacy in-progress flag.
    pub is_syncing: bool,
    /// Time of the last cursor write.
    pub updated_at: DateTime<Utc>,
}

impl IndexerState {
    /// Creates a fresh cursor positioned at `start_block`.
    #[must_use]
    pub fn new(chain: ChainId, start_block: u64) -> Self {
        Self {
            chain,
            last_block_number: start_block,
            is_syncing: false,
            updated_at: Utc::now(),
        }
    }
}
