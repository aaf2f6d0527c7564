//! Protocol statistics DTO.

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::format_amount;
use crate::persistence::ProtocolStats;

/// Response body for `GET /stats`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProtocolStatsResponse {
    /// Network name.
    pub chain: String,
    /// Mirrored pools.
    pub total_pools: u64,
    /// Pools accepting stakes.
    pub active_pools: u64,
    /// Distinct users with an active stake.
    pub total_stakers: u64,
    /// Sum of active stake balances.
    pub total_staked: String,
    /// Rewards paid by withdrawals and claims.
    pub total_rewards_distributed: String,
    /// Indexed events.
    pub total_events: u64,
}

impl ProtocolStatsResponse {
    /// Builds the response from store aggregates.
    #[must_use]
    pub fn new(chain: String, stats: &ProtocolStats) -> Self {
        Self {
            chain,
            total_pools: stats.total_pools,
            active_pools: stats.active_pools,
            total_stakers: stats.unique_stakers,
            total_staked: format_amount(stats.total_staked),
            total_rewards_distributed: format_amount(stats.total_rewards_distributed),
            total_events: stats.total_events,
        }
    }
}
