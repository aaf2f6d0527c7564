//! Pool DTOs for list, detail and stats endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::common_dto::PaginationMeta;
use super::event_dto::EventDto;
use crate::domain::{Pool, format_amount};
use crate::persistence::PoolStats;

/// Filters for `GET /pools`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PoolListQuery {
    /// Only pools currently accepting stakes.
    #[serde(default)]
    pub active_only: bool,
}

/// Mirrored pool. Amounts are decimal strings.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PoolDto {
    /// Network name.
    pub chain: String,
    /// Pool index in the staking contract.
    pub pool_id: u64,
    /// Staked token address.
    pub staking_token: String,
    /// Reward token address.
    pub reward_token: String,
    /// Reward emission rate.
    pub reward_rate: String,
    /// Lock duration in seconds.
    pub lock_duration_secs: u64,
    /// Deposit fee in basis points.
    pub deposit_fee_bps: u32,
    /// Withdraw fee in basis points.
    pub withdraw_fee_bps: u32,
    /// Whether the pool accepts stakes.
    pub is_active: bool,
    /// Contract-reported total staked.
    pub total_staked: String,
    /// Contract-reported APY (basis points).
    pub apy: String,
    /// First mirrored.
    pub created_at: DateTime<Utc>,
    /// Last rewritten by pool sync.
    pub updated_at: DateTime<Utc>,
}

impl From<&Pool> for PoolDto {
    fn from(pool: &Pool) -> Self {
        Self {
            chain: pool.chain.to_string(),
            pool_id: pool.pool_id,
            staking_token: pool.staking_token.clone(),
            reward_token: pool.reward_token.clone(),
            reward_rate: format_amount(pool.reward_rate),
            lock_duration_secs: pool.lock_duration_secs,
            deposit_fee_bps: pool.deposit_fee_bps,
            withdraw_fee_bps: pool.withdraw_fee_bps,
            is_active: pool.is_active,
            total_staked: format_amount(pool.total_staked),
            apy: format_amount(pool.apy),
            created_at: pool.created_at,
            updated_at: pool.updated_at,
        }
    }
}

/// Paginated list response for `GET /pools`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PoolListResponse {
    /// Pools ordered by id.
    pub data: Vec<PoolDto>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}

/// Response body for `GET /pools/{pool_id}/stats`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PoolStatsResponse {
    /// Network name.
    pub chain: String,
    /// Pool id.
    pub pool_id: u64,
    /// Distinct users with an active stake.
    pub unique_stakers: u64,
    /// Sum of active stake balances.
    pub total_staked: String,
    /// Ten most recent events, newest first.
    pub recent_events: Vec<EventDto>,
}

impl PoolStatsResponse {
    /// Builds the response from store aggregates.
    #[must_use]
    pub fn new(chain: String, stats: &PoolStats) -> Self {
        Self {
            chain,
            pool_id: stats.pool_id,
            unique_stakers: stats.unique_stakers,
            total_staked: format_amount(stats.total_staked),
            recent_events: stats.recent_events.iter().map(EventDto::from).collect(),
        }
    }
}
