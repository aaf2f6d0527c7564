//! Query shapes shared by the store implementations and the API.

use chrono::{DateTime, Utc};

use crate::domain::{ChainId, EventKind, Stake, StakingEvent, U256};

/// Offset pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Rows to skip.
    pub offset: u64,
    /// Maximum rows to return.
    pub limit: u64,
}

impl Page {
    /// Creates a page window.
    #[must_use]
    pub const fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// A window wide enough for every row the store can address.
    #[must_use]
    pub const fn all() -> Self {
        Self::new(0, i64::MAX.unsigned_abs())
    }

    /// Applies the window to an already ordered iterator.
    pub fn slice<T>(&self, rows: impl IntoIterator<Item = T>) -> Vec<T> {
        let skip = usize::try_from(self.offset).unwrap_or(usize::MAX);
        let take = usize::try_from(self.limit).unwrap_or(usize::MAX);
        rows.into_iter().skip(skip).take(take).collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, 20)
    }
}

/// One page of rows plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paged<T> {
    /// Rows in this page.
    pub items: Vec<T>,
    /// Matches across all pages.
    pub total: u64,
}

/// Filter for event queries. All set fields must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    /// Chain partition.
    pub chain: ChainId,
    /// Event kind.
    pub kind: Option<EventKind>,
    /// Pool id.
    pub pool_id: Option<u64>,
    /// Lowercase user address.
    pub user_address: Option<String>,
    /// Lowest block (inclusive).
    pub from_block: Option<u64>,
    /// Highest block (inclusive).
    pub to_block: Option<u64>,
    /// Earliest event time (inclusive).
    pub from_time: Option<DateTime<Utc>>,
    /// Latest event time (inclusive).
    pub to_time: Option<DateTime<Utc>>,
}

impl EventFilter {
    /// Matches every event of `chain`.
    #[must_use]
    pub const fn new(chain: ChainId) -> Self {
        Self {
            chain,
            kind: None,
            pool_id: None,
            user_address: None,
            from_block: None,
            to_block: None,
            from_time: None,
            to_time: None,
        }
    }

    /// Returns `true` if `event` passes every set criterion.
    #[must_use]
    pub fn matches(&self, event: &StakingEvent) -> bool {
        event.chain == self.chain
            && self.kind.is_none_or(|kind| event.kind == kind)
            && self.pool_id.is_none_or(|id| event.pool_id == id)
            && self
                .user_address
                .as_deref()
                .is_none_or(|user| event.user_address == user)
            && self.from_block.is_none_or(|b| event.block_number >= b)
            && self.to_block.is_none_or(|b| event.block_number <= b)
            && self.from_time.is_none_or(|t| event.timestamp >= t)
            && self.to_time.is_none_or(|t| event.timestamp <= t)
    }
}

/// Filter for stake queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeFilter {
    /// Chain partition.
    pub chain: ChainId,
    /// Lowercase user address.
    pub user_address: Option<String>,
    /// Pool id.
    pub pool_id: Option<u64>,
    /// Only positions with a non-zero balance.
    pub active_only: bool,
}

impl StakeFilter {
    /// Returns `true` if `stake` passes every set criterion.
    #[must_use]
    pub fn matches(&self, stake: &Stake) -> bool {
        stake.chain == self.chain
            && self
                .user_address
                .as_deref()
                .is_none_or(|user| stake.user_address == user)
            && self.pool_id.is_none_or(|id| stake.pool_id == id)
            && (!self.active_only || stake.is_active)
    }
}

/// Chain-wide aggregates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolStats {
    /// Mirrored pools.
    pub total_pools: u64,
    /// Mirrored pools flagged active.
    pub active_pools: u64,
    /// Distinct users with an active stake.
    pub unique_stakers: u64,
    /// Sum of active stake balances.
    pub total_staked: U256,
    /// Sum of reward amounts paid by `Withdrawn` and `RewardClaimed`.
    pub total_rewards_distributed: U256,
    /// Indexed events.
    pub total_events: u64,
}

/// Aggregates for one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Pool id.
    pub pool_id: u64,
    /// Distinct users with an active stake in the pool.
    pub unique_stakers: u64,
    /// Sum of active stake balances in the pool.
    pub total_staked: U256,
    /// Most recent events, newest first.
    pub recent_events: Vec<StakingEvent>,
}

/// Number of events [`PoolStats::recent_events`] carries.
pub const RECENT_EVENTS: u64 = 10;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(pool_id: u64, block: u64) -> StakingEvent {
        StakingEvent {
            chain: ChainId::new("base"),
            kind: EventKind::Staked,
            tx_hash: format!("0x{block:064x}"),
            block_number: block,
            log_index: 0,
            pool_id,
            user_address: "0xabc".to_string(),
            amount: Some(U256::from(1)),
            reward_amount: None,
            penalty: None,
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default(),
        }
    }

    #[test]
    fn event_filter_combines_criteria() {
        let mut filter = EventFilter::new(ChainId::new("base"));
        filter.pool_id = Some(1);
        filter.from_block = Some(10);
        filter.to_block = Some(20);

        assert!(filter.matches(&event(1, 10)));
        assert!(filter.matches(&event(1, 20)));
        assert!(!filter.matches(&event(1, 21)));
        assert!(!filter.matches(&event(2, 15)));

        filter.chain = ChainId::new("sepolia");
        assert!(!filter.matches(&event(1, 15)));
    }

    #[test]
    fn page_slices_ordered_rows() {
        let page = Page::new(2, 3);
        assert_eq!(page.slice(0..10), vec![2, 3, 4]);
        assert!(Page::new(20, 5).slice(0..10).is_empty());
    }
}
