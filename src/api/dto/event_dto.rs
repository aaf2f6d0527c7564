//! Staking event DTOs and filters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::common_dto::PaginationMeta;
use crate::domain::{StakingEvent, format_amount};

/// Recorded contract event. Amounts are decimal strings.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EventDto {
    /// Network name.
    pub chain: String,
    /// `Staked`, `Withdrawn`, `RewardClaimed` or `EmergencyWithdrawn`.
    pub event_type: String,
    /// Transaction hash.
    pub tx_hash: String,
    /// Block number.
    pub block_number: u64,
    /// Position within the block.
    pub log_index: u64,
    /// Pool id.
    pub pool_id: u64,
    /// Staker address.
    pub user_address: String,
    /// Staked or withdrawn principal.
    pub amount: Option<String>,
    /// Reward paid out.
    pub reward_amount: Option<String>,
    /// Emergency withdrawal penalty.
    pub penalty: Option<String>,
    /// Event time.
    pub timestamp: DateTime<Utc>,
}

impl From<&StakingEvent> for EventDto {
    fn from(event: &StakingEvent) -> Self {
        Self {
            chain: event.chain.to_string(),
            event_type: event.kind.to_string(),
            tx_hash: event.tx_hash.clone(),
            block_number: event.block_number,
            log_index: event.log_index,
            pool_id: event.pool_id,
            user_address: event.user_address.clone(),
            amount: event.amount.map(format_amount),
            reward_amount: event.reward_amount.map(format_amount),
            penalty: event.penalty.map(format_amount),
            timestamp: event.timestamp,
        }
    }
}

/// Filters for `GET /events`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventQuery {
    /// Event kind (case-insensitive).
    pub event_type: Option<String>,
    /// Pool id.
    pub pool_id: Option<u64>,
    /// Staker address.
    pub user_address: Option<String>,
    /// Lowest block (inclusive).
    pub from_block: Option<u64>,
    /// Highest block (inclusive).
    pub to_block: Option<u64>,
    /// Earliest event time (RFC 3339, inclusive).
    pub from_time: Option<DateTime<Utc>>,
    /// Latest event time (RFC 3339, inclusive).
    pub to_time: Option<DateTime<Utc>>,
}

/// Filters for `GET /users/{address}/history`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Event kind (case-insensitive).
    pub event_type: Option<String>,
}

/// Paginated event list.
#[derive(Debug, Serialize, ToSchema)]
pub struct EventListResponse {
    /// Events, newest first.
    pub data: Vec<EventDto>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}
