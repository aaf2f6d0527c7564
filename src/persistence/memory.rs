//! In-process ledger with serialized transactions.
//!
//! A transaction holds the table lock for its whole lifetime and writes in
//! place, keeping an undo log; rollback or drop replays it. Writers (and
//! readers) therefore observe either all of a batch or none of it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::models::RECENT_EVENTS;
use super::{
    EventFilter, LedgerReader, LedgerStore, LedgerTx, Page, Paged, PoolStats, ProtocolStats,
    StakeFilter,
};
use crate::domain::{ChainId, EventKind, IndexerState, Pool, Stake, StakingEvent, U256};
use crate::error::IndexerError;

type StakeKey = (ChainId, u64, String);
type EventKey = (ChainId, String, u64);

fn event_key(event: &StakingEvent) -> EventKey {
    (event.chain.clone(), event.tx_hash.clone(), event.log_index)
}

#[derive(Debug, Default)]
struct LedgerTables {
    states: BTreeMap<ChainId, IndexerState>,
    pools: BTreeMap<(ChainId, u64), Pool>,
    stakes: BTreeMap<StakeKey, Stake>,
    events: Vec<StakingEvent>,
    event_keys: BTreeSet<EventKey>,
}

impl LedgerTables {
    /// Events matching `filter`, newest first.
    fn events_desc(&self, filter: &EventFilter) -> Vec<StakingEvent> {
        let mut events: Vec<StakingEvent> = self
            .events
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            (b.block_number, b.log_index).cmp(&(a.block_number, a.log_index))
        });
        events
    }

    fn active_stakes<'a>(
        &'a self,
        chain: &'a ChainId,
        pool_id: Option<u64>,
    ) -> impl Iterator<Item = &'a Stake> + 'a {
        self.stakes.values().filter(move |s| {
            &s.chain == chain && s.is_active && pool_id.is_none_or(|id| s.pool_id == id)
        })
    }

    fn revert(&mut self, undo: Undo) {
        match undo {
            Undo::State(chain, Some(state)) => {
                self.states.insert(chain, state);
            }
            Undo::State(chain, None) => {
                self.states.remove(&chain);
            }
            Undo::Pool(key, Some(pool)) => {
                self.pools.insert(key, pool);
            }
            Undo::Pool(key, None) => {
                self.pools.remove(&key);
            }
            Undo::Stake(key, Some(stake)) => {
                self.stakes.insert(key, stake);
            }
            Undo::Stake(key, None) => {
                self.stakes.remove(&key);
            }
            Undo::Event => {
                if let Some(event) = self.events.pop() {
                    self.event_keys.remove(&event_key(&event));
                }
            }
        }
    }
}

/// Previous value of one row written by an open transaction.
#[derive(Debug)]
enum Undo {
    State(ChainId, Option<IndexerState>),
    Pool((ChainId, u64), Option<Pool>),
    Stake(StakeKey, Option<Stake>),
    Event,
}

fn stake_totals<'a>(stakes: impl Iterator<Item = &'a Stake>) -> (u64, U256) {
    let mut users = BTreeSet::new();
    let mut total = U256::ZERO;
    for stake in stakes {
        users.insert(stake.user_address.as_str());
        total = total.saturating_add(stake.staked_amount);
    }
    (users.len() as u64, total)
}

/// In-memory [`LedgerStore`] and [`LedgerReader`].
///
/// Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    tables: Arc<Mutex<LedgerTables>>,
    failing_commits: Arc<AtomicUsize>,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` commits fail after all writes were staged.
    pub fn fail_next_commits(&self, count: usize) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, IndexerError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        Ok(Box::new(MemoryTx {
            guard,
            undo: Vec::new(),
            failing_commits: Arc::clone(&self.failing_commits),
        }))
    }
}

/// Writes go straight to the locked tables; anything not committed is
/// reverted from the undo log, newest first, when the transaction drops.
#[derive(Debug)]
struct MemoryTx {
    guard: OwnedMutexGuard<LedgerTables>,
    undo: Vec<Undo>,
    failing_commits: Arc<AtomicUsize>,
}

impl MemoryTx {
    fn discard(&mut self) {
        while let Some(undo) = self.undo.pop() {
            self.guard.revert(undo);
        }
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        self.discard();
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn indexer_state(
        &mut self,
        chain: &ChainId,
    ) -> Result<Option<IndexerState>, IndexerError> {
        Ok(self.guard.states.get(chain).cloned())
    }

    async fn insert_indexer_state(&mut self, state: &IndexerState) -> Result<(), IndexerError> {
        if !self.guard.states.contains_key(&state.chain) {
            self.guard.states.insert(state.chain.clone(), state.clone());
            self.undo.push(Undo::State(state.chain.clone(), None));
        }
        Ok(())
    }

    async fn advance_cursor(
        &mut self,
        chain: &ChainId,
        expected: u64,
        to: u64,
    ) -> Result<(), IndexerError> {
        let state = self.guard.states.get_mut(chain).ok_or_else(|| {
            IndexerError::Persistence(format!("no indexer state for {chain}"))
        })?;
        if state.last_block_number != expected || to < expected {
            return Err(IndexerError::CursorConflict {
                chain: chain.to_string(),
                expected,
                found: state.last_block_number,
            });
        }
        let previous = state.clone();
        state.last_block_number = to;
        state.is_syncing = false;
        state.updated_at = Utc::now();
        self.undo.push(Undo::State(chain.clone(), Some(previous)));
        Ok(())
    }

    async fn pool(&mut self, chain: &ChainId, pool_id: u64) -> Result<Option<Pool>, IndexerError> {
        Ok(self.guard.pools.get(&(chain.clone(), pool_id)).cloned())
    }

    async fn upsert_pool(&mut self, pool: &Pool) -> Result<(), IndexerError> {
        let key = (pool.chain.clone(), pool.pool_id);
        let created_at = self
            .guard
            .pools
            .get(&key)
            .map_or(pool.created_at, |existing| existing.created_at);
        let previous = self.guard.pools.insert(
            key.clone(),
            Pool {
                created_at,
                ..pool.clone()
            },
        );
        self.undo.push(Undo::Pool(key, previous));
        Ok(())
    }

    async fn stake(
        &mut self,
        chain: &ChainId,
        pool_id: u64,
        user_address: &str,
    ) -> Result<Option<Stake>, IndexerError> {
        Ok(self
            .guard
            .stakes
            .get(&(chain.clone(), pool_id, user_address.to_string()))
            .cloned())
    }

    async fn upsert_stake(&mut self, stake: &Stake) -> Result<(), IndexerError> {
        let key = (stake.chain.clone(), stake.pool_id, stake.user_address.clone());
        let previous = self.guard.stakes.insert(key.clone(), stake.clone());
        self.undo.push(Undo::Stake(key, previous));
        Ok(())
    }

    async fn insert_event(&mut self, event: &StakingEvent) -> Result<bool, IndexerError> {
        if !self.guard.event_keys.insert(event_key(event)) {
            return Ok(false);
        }
        self.guard.events.push(event.clone());
        self.undo.push(Undo::Event);
        Ok(true)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), IndexerError> {
        let injected = self
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            self.discard();
            return Err(IndexerError::Persistence(
                "injected commit failure".to_string(),
            ));
        }
        self.undo.clear();
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), IndexerError> {
        self.discard();
        Ok(())
    }
}

#[async_trait]
impl LedgerReader for MemoryLedger {
    async fn list_pools(
        &self,
        chain: &ChainId,
        active_only: bool,
        page: Page,
    ) -> Result<Paged<Pool>, IndexerError> {
        let tables = self.tables.lock().await;
        let pools: Vec<&Pool> = tables
            .pools
            .values()
            .filter(|p| &p.chain == chain && (!active_only || p.is_active))
            .collect();
        Ok(Paged {
            total: pools.len() as u64,
            items: page.slice(pools.into_iter().cloned()),
        })
    }

    async fn get_pool(&self, chain: &ChainId, pool_id: u64) -> Result<Option<Pool>, IndexerError> {
        let tables = self.tables.lock().await;
        Ok(tables.pools.get(&(chain.clone(), pool_id)).cloned())
    }

    async fn list_stakes(
        &self,
        filter: &StakeFilter,
        page: Page,
    ) -> Result<Paged<Stake>, IndexerError> {
        let tables = self.tables.lock().await;
        let stakes: Vec<&Stake> = tables.stakes.values().filter(|s| filter.matches(s)).collect();
        Ok(Paged {
            total: stakes.len() as u64,
            items: page.slice(stakes.into_iter().cloned()),
        })
    }

    async fn list_events(
        &self,
        filter: &EventFilter,
        page: Page,
    ) -> Result<Paged<StakingEvent>, IndexerError> {
        let tables = self.tables.lock().await;
        let events = tables.events_desc(filter);
        Ok(Paged {
            total: events.len() as u64,
            items: page.slice(events),
        })
    }

    async fn protocol_stats(&self, chain: &ChainId) -> Result<ProtocolStats, IndexerError> {
        let tables = self.tables.lock().await;
        let pools: Vec<&Pool> = tables.pools.values().filter(|p| &p.chain == chain).collect();
        let (unique_stakers, total_staked) = stake_totals(tables.active_stakes(chain, None));

        let mut total_events = 0_u64;
        let mut total_rewards_distributed = U256::ZERO;
        for event in tables.events.iter().filter(|e| &e.chain == chain) {
            total_events += 1;
            if matches!(event.kind, EventKind::Withdrawn | EventKind::RewardClaimed) {
                total_rewards_distributed = total_rewards_distributed
                    .saturating_add(event.reward_amount.unwrap_or_default());
            }
        }

        Ok(ProtocolStats {
            total_pools: pools.len() as u64,
            active_pools: pools.iter().filter(|p| p.is_active).count() as u64,
            unique_stakers,
            total_staked,
            total_rewards_distributed,
            total_events,
        })
    }

    async fn pool_stats(
        &self,
        chain: &ChainId,
        pool_id: u64,
    ) -> Result<Option<PoolStats>, IndexerError> {
        let tables = self.tables.lock().await;
        if !tables.pools.contains_key(&(chain.clone(), pool_id)) {
            return Ok(None);
        }
        let (unique_stakers, total_staked) =
            stake_totals(tables.active_stakes(chain, Some(pool_id)));

        let mut filter = EventFilter::new(chain.clone());
        filter.pool_id = Some(pool_id);
        let recent_events = Page::new(0, RECENT_EVENTS).slice(tables.events_desc(&filter));

        Ok(Some(PoolStats {
            pool_id,
            unique_stakers,
            total_staked,
            recent_events,
        }))
    }

    async fn indexer_state(&self, chain: &ChainId) -> Result<Option<IndexerState>, IndexerError> {
        let tables = self.tables.lock().await;
        Ok(tables.states.get(chain).cloned())
    }
}
