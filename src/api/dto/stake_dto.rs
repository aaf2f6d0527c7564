//! User stake and live position DTOs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::chain::UserSnapshot;
use crate::domain::{Stake, U256, format_amount};

/// Ledger position of one user in one pool.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StakeDto {
    /// Pool id.
    pub pool_id: u64,
    /// Principal staked.
    pub staked_amount: String,
    /// Rewards pending as last known to the ledger.
    pub pending_rewards: String,
    /// Time of the latest stake.
    pub last_stake_time: Option<DateTime<Utc>>,
    /// Time the position unlocks.
    pub unlock_time: Option<DateTime<Utc>>,
    /// Unlock time still in the future.
    pub is_locked: bool,
    /// Time of the last mutation.
    pub updated_at: DateTime<Utc>,
}

impl StakeDto {
    /// Builds the DTO, evaluating the lock against `now`.
    #[must_use]
    pub fn new(stake: &Stake, now: DateTime<Utc>) -> Self {
        Self {
            pool_id: stake.pool_id,
            staked_amount: format_amount(stake.staked_amount),
            pending_rewards: format_amount(stake.pending_rewards),
            last_stake_time: stake.last_stake_time,
            unlock_time: stake.unlock_time,
            is_locked: stake.is_locked(now),
            updated_at: stake.updated_at,
        }
    }
}

/// Response body for `GET /users/{address}/stakes`.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserStakesResponse {
    /// Network name.
    pub chain: String,
    /// Staker address.
    pub user_address: String,
    /// Active positions.
    pub stakes: Vec<StakeDto>,
}

/// Live on-chain position.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PositionDto {
    /// Pool id.
    pub pool_id: u64,
    /// Principal staked.
    pub staked_amount: String,
    /// Claimable rewards now.
    pub pending_rewards: String,
    /// Unix time of the latest stake.
    pub last_stake_time: u64,
    /// Unix time the position unlocks.
    pub unlock_time: u64,
    /// Unlock time still in the future.
    pub is_locked: bool,
    /// Pool APY (basis points), `"0"` when unavailable.
    pub apy: String,
}

impl PositionDto {
    /// Builds the DTO from a live snapshot.
    #[must_use]
    pub fn new(pool_id: u64, info: &UserSnapshot, apy: Option<U256>, now_secs: u64) -> Self {
        Self {
            pool_id,
            staked_amount: format_amount(info.staked_amount),
            pending_rewards: format_amount(info.pending_rewards),
            last_stake_time: info.last_stake_time,
            unlock_time: info.unlock_time,
            is_locked: info.unlock_time > now_secs,
            apy: format_amount(apy.unwrap_or_default()),
        }
    }
}

/// Response body for `GET /users/{address}/positions`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PositionsResponse {
    /// Network name.
    pub chain: String,
    /// Staker address.
    pub user_address: String,
    /// Pools with a non-zero balance or pending rewards.
    pub positions: Vec<PositionDto>,
}
