//! Persistence layer: transactional ledger store and read queries.
//!
//! The indexing engine writes through [`LedgerStore`] / [`LedgerTx`]: one
//! transaction per block batch (or pool sync pass), committed as a unit.
//! The API reads through [`LedgerReader`]. [`PostgresLedger`] backs
//! production; [`MemoryLedger`] backs tests and database-less runs.

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;

use crate::domain::{ChainId, IndexerState, Pool, Stake, StakingEvent};
use crate::error::IndexerError;

pub use memory::MemoryLedger;
pub use models::{EventFilter, Page, Paged, PoolStats, ProtocolStats, StakeFilter};
pub use postgres::PostgresLedger;

/// Opens write transactions.
#[async_trait]
pub trait LedgerStore: Send + Sync + fmt::Debug {
    /// Begins a transaction. Dropping it without commit discards its
    /// writes.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Persistence`] if the store is unreachable.
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, IndexerError>;
}

/// One atomic unit of ledger writes.
///
/// All methods return [`IndexerError::Persistence`] on storage failure.
#[async_trait]
pub trait LedgerTx: Send + fmt::Debug {
    /// Reads the chain's cursor, locking it for the rest of the
    /// transaction where the backend supports row locks.
    async fn indexer_state(&mut self, chain: &ChainId)
    -> Result<Option<IndexerState>, IndexerError>;

    /// Inserts a cursor row; a no-op if one already exists.
    async fn insert_indexer_state(&mut self, state: &IndexerState) -> Result<(), IndexerError>;

    /// Moves the cursor from `expected` to `to`.
    ///
    /// Fails with [`IndexerError::CursorConflict`] if the stored cursor is
    /// not `expected`, or if `to < expected`.
    async fn advance_cursor(
        &mut self,
        chain: &ChainId,
        expected: u64,
        to: u64,
    ) -> Result<(), IndexerError>;

    /// Reads one pool row.
    async fn pool(&mut self, chain: &ChainId, pool_id: u64) -> Result<Option<Pool>, IndexerError>;

    /// Inserts a pool, or overwrites every field but `created_at`.
    async fn upsert_pool(&mut self, pool: &Pool) -> Result<(), IndexerError>;

    /// Reads one stake row.
    async fn stake(
        &mut self,
        chain: &ChainId,
        pool_id: u64,
        user_address: &str,
    ) -> Result<Option<Stake>, IndexerError>;

    /// Inserts or overwrites a stake row.
    async fn upsert_stake(&mut self, stake: &Stake) -> Result<(), IndexerError>;

    /// Appends an event. Returns `false` if `(chain, tx_hash, log_index)`
    /// is already recorded.
    async fn insert_event(&mut self, event: &StakingEvent) -> Result<bool, IndexerError>;

    /// Makes every write visible atomically.
    async fn commit(self: Box<Self>) -> Result<(), IndexerError>;

    /// Discards every write.
    async fn rollback(self: Box<Self>) -> Result<(), IndexerError>;
}

/// Read-side queries used by the API.
///
/// All methods return [`IndexerError::Persistence`] on storage failure.
#[async_trait]
pub trait LedgerReader: Send + Sync + fmt::Debug {
    /// Pools ordered by id.
    async fn list_pools(
        &self,
        chain: &ChainId,
        active_only: bool,
        page: Page,
    ) -> Result<Paged<Pool>, IndexerError>;

    /// One pool.
    async fn get_pool(&self, chain: &ChainId, pool_id: u64) -> Result<Option<Pool>, IndexerError>;

    /// Stakes ordered by pool id, then user.
    async fn list_stakes(
        &self,
        filter: &StakeFilter,
        page: Page,
    ) -> Result<Paged<Stake>, IndexerError>;

    /// Events newest first.
    async fn list_events(
        &self,
        filter: &EventFilter,
        page: Page,
    ) -> Result<Paged<StakingEvent>, IndexerError>;

    /// Chain-wide aggregates.
    async fn protocol_stats(&self, chain: &ChainId) -> Result<ProtocolStats, IndexerError>;

    /// Aggregates for one pool; `None` if the pool is not mirrored.
    async fn pool_stats(
        &self,
        chain: &ChainId,
        pool_id: u64,
    ) -> Result<Option<PoolStats>, IndexerError>;

    /// The chain's persisted cursor.
    async fn indexer_state(&self, chain: &ChainId) -> Result<Option<IndexerState>, IndexerError>;
}
