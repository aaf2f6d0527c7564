//! Local mirror of one on-chain staking pool.

use chrono::{DateTime, Utc};

use super::{ChainId, U256};

/// Lock duration applied when a stake references a pool that pool sync has
/// not mirrored yet.
pub const DEFAULT_LOCK_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Mirror of an on-chain pool configuration.
///
/// Created and overwritten by pool sync from the chain's authoritative pool
/// list; never deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    /// Chain partition.
    pub chain: ChainId,
    /// Pool index in the staking contract.
    pub pool_id: u64,
    /// Address of the token users stake.
    pub staking_token: String,
    /// Address of the token rewards are paid in.
    pub reward_token: String,
    /// Reward emission rate, in reward token base units per second.
    pub reward_rate: U256,
    /// Seconds a deposit stays locked after the latest stake.
    pub lock_duration_secs: u64,
    /// Deposit fee in basis points.
    pub deposit_fee_bps: u32,
    /// Withdraw fee in basis points.
    pub withdraw_fee_bps: u32,
    /// Whether the pool accepts new stakes.
    pub is_active: bool,
    /// Total staked as reported by the contract at the last sync.
    pub total_staked: U256,
    /// Opaque APY figure reported by the contract at the last sync.
    pub apy: U256,
    /// First time the pool was mirrored.
    pub created_at: DateTime<Utc>,
    /// Last time pool sync rewrote the row.
    pub updated_at: DateTime<Utc>,
}
