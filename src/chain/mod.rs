//! Chain client: read access to one network's staking contract.
//!
//! [`ChainClient`] is the seam between the indexing engine and the RPC
//! surface. Read queries degrade to "no data" on failure (logged, never
//! raised); only the chain-head query reports errors, because the engine
//! cannot compute a batch without it.
//!
//! [`ChainClient::get_all_events`] is the ordering contract the engine
//! relies on: events of every kind, sorted by `(block_number, log_index)`.

pub mod contract;
#[cfg(test)]
pub(crate) mod mock;
pub mod rpc;

use std::fmt;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ChainId, EventKind, U256};
use crate::error::IndexerError;

pub use rpc::EvmChainClient;

/// Closed, inclusive block interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    /// First block of the range.
    pub from: u64,
    /// Last block of the range (inclusive).
    pub to: u64,
}

impl BlockRange {
    /// Creates a range, or `None` when `from > to`.
    #[must_use]
    pub const fn new(from: u64, to: u64) -> Option<Self> {
        if from > to {
            None
        } else {
            Some(Self { from, to })
        }
    }

    /// Number of blocks covered; at least one.
    #[must_use]
    pub const fn block_count(&self) -> u64 {
        self.to - self.from + 1
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}

/// Header fields the engine needs from a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    /// Block number.
    pub number: u64,
    /// Block hash.
    pub hash: String,
    /// Block timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Pool struct as returned by the staking contract, plus its APY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSnapshot {
    /// Pool index.
    pub pool_id: u64,
    /// Staking token address.
    pub staking_token: String,
    /// Reward token address.
    pub reward_token: String,
    /// Contract-reported total staked.
    pub total_staked: U256,
    /// Reward emission rate.
    pub reward_rate: U256,
    /// Lock duration in seconds.
    pub lock_duration_secs: u64,
    /// Whether the pool is open.
    pub is_active: bool,
    /// Deposit fee in basis points.
    pub deposit_fee_bps: u32,
    /// Withdraw fee in basis points.
    pub withdraw_fee_bps: u32,
    /// Opaque APY value from `getPoolAPY` (basis points on StakeFlow).
    pub apy: U256,
}

/// One user's on-chain position in one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSnapshot {
    /// Principal staked.
    pub staked_amount: U256,
    /// Reward debt bookkeeping value.
    pub reward_debt: U256,
    /// Rewards claimable right now (from `pendingRewards`).
    pub pending_rewards: U256,
    /// Unix time of the last stake.
    pub last_stake_time: u64,
    /// Unix time the position unlocks.
    pub unlock_time: u64,
}

/// Summary of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptSummary {
    /// Transaction hash.
    pub tx_hash: String,
    /// Including block, if mined.
    pub block_number: Option<u64>,
    /// Execution succeeded.
    pub success: bool,
    /// Gas consumed.
    pub gas_used: u64,
    /// Effective gas price in wei.
    pub effective_gas_price: u128,
}

/// A decoded staking contract log, before timestamps are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Event kind.
    pub kind: EventKind,
    /// Transaction hash (`0x`-prefixed lowercase hex).
    pub tx_hash: String,
    /// Block containing the log.
    pub block_number: u64,
    /// Log position within the block.
    pub log_index: u64,
    /// Indexed `poolId` argument.
    pub pool_id: u64,
    /// Indexed `user` argument (`0x`-prefixed lowercase hex).
    pub user_address: String,
    /// `amount` argument, where present.
    pub amount: Option<U256>,
    /// `rewardAmount` argument, where present.
    pub reward_amount: Option<U256>,
    /// `penalty` argument, where present.
    pub penalty: Option<U256>,
    /// The event's own `timestamp` argument, where present.
    pub emitted_at: Option<u64>,
}

/// Read-only adapter to one chain's staking deployment.
///
/// Implementations are stateless per call and shared between the engine
/// and the API behind an `Arc`.
#[async_trait]
pub trait ChainClient: Send + Sync + fmt::Debug {
    /// The chain this client reads.
    fn chain(&self) -> &ChainId;

    /// Returns the current chain head.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Rpc`] if the node cannot be queried.
    async fn get_block_number(&self) -> Result<u64, IndexerError>;

    /// Returns header data for `number`, or `None` on failure.
    async fn get_block(&self, number: u64) -> Option<BlockInfo>;

    /// Returns the number of registered pools; 0 on any fault.
    async fn get_pool_count(&self) -> u64;

    /// Returns the pool struct and APY, or `None` on failure.
    async fn get_pool_info(&self, pool_id: u64) -> Option<PoolSnapshot>;

    /// Returns a user's position in a pool, or `None` on failure.
    async fn get_user_info(&self, pool_id: u64, user: Address) -> Option<UserSnapshot>;

    /// Returns all logs of one kind in `range`; empty on failure.
    ///
    /// A decode failure in any log drops the whole kind for this range.
    async fn get_events(&self, kind: EventKind, range: BlockRange) -> Vec<RawEvent>;

    /// Returns the union of all kinds in `range`, sorted ascending by
    /// `(block_number, log_index)`.
    async fn get_all_events(&self, range: BlockRange) -> Vec<RawEvent> {
        let mut events = Vec::new();
        for kind in EventKind::ALL {
            events.extend(self.get_events(kind, range).await);
        }
        sort_events(&mut events);
        events
    }

    /// Returns a receipt summary, or `None` if unknown or on failure.
    async fn get_transaction_receipt(&self, tx_hash: B256) -> Option<ReceiptSummary>;

    /// Returns the current gas price in wei; 0 on failure.
    async fn gas_price(&self) -> u128;
}

/// Sorts events into emission order. Stable, so equal keys keep their
/// fetch order.
pub fn sort_events(events: &mut [RawEvent]) {
    events.sort_by_key(|event| (event.block_number, event.log_index));
}

/// Formats an address as `0x`-prefixed lowercase hex.
#[must_use]
pub fn format_address(address: &Address) -> String {
    format!("{address:?}").to_lowercase()
}

/// Formats a 32-byte hash as `0x`-prefixed lowercase hex.
#[must_use]
pub fn format_hash(hash: &B256) -> String {
    format!("{hash:?}").to_lowercase()
}
