//! In-memory [`ChainClient`] for engine and API tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use chrono::DateTime;

use super::{
    BlockInfo, BlockRange, ChainClient, PoolSnapshot, RawEvent, ReceiptSummary, UserSnapshot,
    format_hash,
};
use crate::domain::{ChainId, EventKind, U256};
use crate::error::IndexerError;

#[derive(Debug, Default)]
struct MockState {
    head: u64,
    head_unavailable: bool,
    pools: BTreeMap<u64, PoolSnapshot>,
    users: HashMap<(u64, Address), UserSnapshot>,
    events: Vec<RawEvent>,
    failing_kinds: HashSet<EventKind>,
    block_times: HashMap<u64, i64>,
    misnumbered_blocks: HashMap<u64, u64>,
    receipts: HashMap<B256, ReceiptSummary>,
    event_queries: usize,
}

/// Scriptable chain: head, pools, per-kind logs and failures.
#[derive(Debug)]
pub(crate) struct MockChainClient {
    chain: ChainId,
    state: Mutex<MockState>,
}

impl MockChainClient {
    pub(crate) fn new(chain: &str) -> Self {
        Self {
            chain: ChainId::new(chain),
            state: Mutex::new(MockState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_head(&self, head: u64) {
        self.state().head = head;
    }

    pub(crate) fn set_head_unavailable(&self, unavailable: bool) {
        self.state().head_unavailable = unavailable;
    }

    pub(crate) fn put_pool(&self, pool: PoolSnapshot) {
        self.state().pools.insert(pool.pool_id, pool);
    }

    pub(crate) fn put_user(&self, pool_id: u64, user: Address, info: UserSnapshot) {
        self.state().users.insert((pool_id, user), info);
    }

    pub(crate) fn push_event(&self, event: RawEvent) {
        self.state().events.push(event);
    }

    pub(crate) fn fail_kind(&self, kind: EventKind) {
        self.state().failing_kinds.insert(kind);
    }

    pub(crate) fn set_block_time(&self, block: u64, unix_secs: i64) {
        self.state().block_times.insert(block, unix_secs);
    }

    /// Makes `get_block(requested)` answer with a header numbered `returned`.
    pub(crate) fn misnumber_block(&self, requested: u64, returned: u64) {
        self.state().misnumbered_blocks.insert(requested, returned);
    }

    pub(crate) fn put_receipt(&self, hash: B256, receipt: ReceiptSummary) {
        self.state().receipts.insert(hash, receipt);
    }

    /// Number of per-kind log queries served so far.
    pub(crate) fn event_queries(&self) -> usize {
        self.state().event_queries
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    fn chain(&self) -> &ChainId {
        &self.chain
    }

    async fn get_block_number(&self) -> Result<u64, IndexerError> {
        let state = self.state();
        if state.head_unavailable {
            return Err(IndexerError::Rpc("head unavailable".to_string()));
        }
        Ok(state.head)
    }

    async fn get_block(&self, number: u64) -> Option<BlockInfo> {
        let state = self.state();
        let secs = *state.block_times.get(&number)?;
        Some(BlockInfo {
            number: state.misnumbered_blocks.get(&number).copied().unwrap_or(number),
            hash: format_hash(&B256::with_last_byte(u8::try_from(number % 256).unwrap_or(0))),
            timestamp: DateTime::from_timestamp(secs, 0)?,
        })
    }

    async fn get_pool_count(&self) -> u64 {
        self.state()
            .pools
            .keys()
            .next_back()
            .map_or(0, |last| last + 1)
    }

    async fn get_pool_info(&self, pool_id: u64) -> Option<PoolSnapshot> {
        self.state().pools.get(&pool_id).cloned()
    }

    async fn get_user_info(&self, pool_id: u64, user: Address) -> Option<UserSnapshot> {
        self.state().users.get(&(pool_id, user)).cloned()
    }

    async fn get_events(&self, kind: EventKind, range: BlockRange) -> Vec<RawEvent> {
        let mut state = self.state();
        state.event_queries += 1;
        if state.failing_kinds.contains(&kind) {
            return Vec::new();
        }
        state
            .events
            .iter()
            .filter(|e| e.kind == kind && (range.from..=range.to).contains(&e.block_number))
            .cloned()
            .collect()
    }

    async fn get_transaction_receipt(&self, tx_hash: B256) -> Option<ReceiptSummary> {
        self.state().receipts.get(&tx_hash).cloned()
    }

    async fn gas_price(&self) -> u128 {
        1_000_000_000
    }
}

/// Builds a minimal event at `(block, log_index)`.
pub(crate) fn raw_event(kind: EventKind, block: u64, log_index: u64) -> RawEvent {
    RawEvent {
        kind,
        tx_hash: format!("0x{block:032x}{log_index:032x}"),
        block_number: block,
        log_index,
        pool_id: 0,
        user_address: format!("0x{}", "ab".repeat(20)),
        amount: Some(U256::from(100)),
        reward_amount: None,
        penalty: None,
        emitted_at: None,
    }
}

/// Builds a pool snapshot with the given lock duration.
pub(crate) fn pool_snapshot(pool_id: u64, lock_duration_secs: u64) -> PoolSnapshot {
    PoolSnapshot {
        pool_id,
        staking_token: format!("0x{}", "11".repeat(20)),
        reward_token: format!("0x{}", "22".repeat(20)),
        total_staked: U256::ZERO,
        reward_rate: U256::from(10),
        lock_duration_secs,
        is_active: true,
        deposit_fee_bps: 50,
        withdraw_fee_bps: 25,
        apy: U256::from(1_200),
    }
}
