//! Per-chain indexing engine.
//!
//! One [`IndexerEngine`] owns one chain. Each iteration reads the durable
//! cursor and the chain head, syncs pools, and ingests the next block batch
//! inside a single ledger transaction. The cursor moves only when that
//! transaction commits, so a crash or failed attempt replays the same
//! range from the same starting point.
//!
//! ```text
//! Uninitialized ──► CatchingUp ◄──► Idle
//!                        │            │
//!                        └──► Stopped ◄┘
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::pool_sync::sync_pools;
use super::retry::{RetryPolicy, sleep_or_cancel};
use crate::chain::{BlockRange, ChainClient, RawEvent};
use crate::config::{ChainConfig, IndexerConfig};
use crate::domain::{
    ChainId, DEFAULT_LOCK_DURATION_SECS, IndexerState, StakingEvent, apply_event,
};
use crate::error::IndexerError;
use crate::persistence::{LedgerStore, LedgerTx};

/// Tunables for one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Maximum blocks per batch.
    pub batch_size: u64,
    /// Wait between polls once caught up.
    pub poll_interval: Duration,
    /// Cursor value for a chain seen for the first time.
    pub start_block: u64,
    /// Per-batch retry schedule.
    pub retry: RetryPolicy,
    /// Wait after a batch exhausted its retries.
    pub failure_cooldown: Duration,
}

impl EngineSettings {
    /// Resolves the settings for `chain` from the loaded configuration.
    #[must_use]
    pub fn new(chain: &ChainConfig, config: &IndexerConfig) -> Self {
        Self {
            batch_size: chain.batch_size,
            poll_interval: Duration::from_secs(chain.poll_interval_secs),
            start_block: chain.start_block,
            retry: RetryPolicy {
                max_attempts: config.retry_attempts,
                min_backoff: Duration::from_secs(config.retry_min_backoff_secs),
                max_backoff: Duration::from_secs(config.retry_max_backoff_secs),
            },
            failure_cooldown: Duration::from_secs(config.failure_cooldown_secs),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batch_size: 1_000,
            poll_interval: Duration::from_secs(15),
            start_block: 0,
            retry: RetryPolicy::default(),
            failure_cooldown: Duration::from_secs(5),
        }
    }
}

/// Lifecycle phase of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Cursor not yet loaded.
    Uninitialized,
    /// Behind the safe head, ingesting batches.
    CatchingUp,
    /// Caught up, waiting for the next poll.
    Idle,
    /// Loop exited.
    Stopped,
}

impl EngineState {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::CatchingUp => "catching_up",
            Self::Idle => "idle",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live view of an engine, published on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerStatus {
    /// Lifecycle phase.
    pub state: EngineState,
    /// Last committed block, once known.
    pub last_processed: Option<u64>,
    /// Latest head seen.
    pub chain_head: Option<u64>,
    /// Iterations that failed in a row.
    pub consecutive_failures: u32,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
}

impl Default for IndexerStatus {
    fn default() -> Self {
        Self {
            state: EngineState::Uninitialized,
            last_processed: None,
            chain_head: None,
            consecutive_failures: 0,
            last_error: None,
        }
    }
}

/// Result of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A batch was committed.
    Indexed {
        /// Blocks covered.
        range: BlockRange,
        /// Events recorded.
        events: usize,
    },
    /// The cursor already sits at the safe head.
    UpToDate,
}

/// Computes the next batch: `last+1 ..= min(head-1, last+batch_size)`.
///
/// The newest block is held back by one. Returns `None` when there is
/// nothing to index yet. A `batch_size` of zero is treated as one.
#[must_use]
pub fn next_range(last: u64, head: u64, batch_size: u64) -> Option<BlockRange> {
    let safe_head = head.checked_sub(1)?;
    if safe_head <= last {
        return None;
    }
    let to = safe_head.min(last.saturating_add(batch_size.max(1)));
    BlockRange::new(last + 1, to)
}

/// Cursor a batch over `range` must find: the block before `range.from`.
/// Block 0 is never indexed, so a range starting there is rejected.
fn expected_cursor(range: BlockRange) -> Result<u64, IndexerError> {
    range.from.checked_sub(1).ok_or_else(|| {
        IndexerError::InvalidRequest(format!("block range {range} must start after block 0"))
    })
}

/// Ingestion loop for one chain.
#[derive(Debug)]
pub struct IndexerEngine {
    chain: ChainId,
    client: Arc<dyn ChainClient>,
    store: Arc<dyn LedgerStore>,
    settings: EngineSettings,
    token: CancellationToken,
    status: watch::Sender<IndexerStatus>,
}

impl IndexerEngine {
    /// Creates an engine. Cancelling `token` stops it.
    #[must_use]
    pub fn new(
        client: Arc<dyn ChainClient>,
        store: Arc<dyn LedgerStore>,
        settings: EngineSettings,
        token: CancellationToken,
    ) -> Self {
        let (status, _) = watch::channel(IndexerStatus::default());
        Self {
            chain: client.chain().clone(),
            client,
            store,
            settings,
            token,
            status,
        }
    }

    /// Chain this engine indexes.
    #[must_use]
    pub const fn chain(&self) -> &ChainId {
        &self.chain
    }

    /// Subscribes to status updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<IndexerStatus> {
        self.status.subscribe()
    }

    /// Requests a stop. Waits end immediately; a batch already in flight
    /// finishes or rolls back on its own.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Loads the cursor, creating it at the configured start block on first
    /// run.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Persistence`] if the store is unavailable.
    pub async fn initialize(&self) -> Result<IndexerState, IndexerError> {
        let mut tx = self.store.begin().await?;
        let state = match tx.indexer_state(&self.chain).await {
            Ok(Some(state)) => {
                tx.rollback().await?;
                state
            }
            Ok(None) => {
                let state = IndexerState::new(self.chain.clone(), self.settings.start_block);
                tx.insert_indexer_state(&state).await?;
                tx.commit().await?;
                tracing::info!(chain = %self.chain, start_block = state.last_block_number, "indexer state created");
                state
            }
            Err(e) => {
                discard(tx, &self.chain).await;
                return Err(e);
            }
        };
        self.status.send_modify(|s| s.last_processed = Some(state.last_block_number));
        Ok(state)
    }

    /// Runs until stopped. Failures are logged, counted and retried after
    /// the cooldown; the loop itself never gives up.
    pub async fn run(self) {
        tracing::info!(chain = %self.chain, "indexer started");

        while !self.token.is_cancelled() {
            match self.initialize().await {
                Ok(_) => break,
                Err(e) => {
                    if self.record_failure(&e).await.is_err() {
                        break;
                    }
                }
            }
        }

        while !self.token.is_cancelled() {
            match self.poll_once().await {
                Ok(PollOutcome::Indexed { .. }) => {
                    self.status.send_modify(|s| {
                        s.consecutive_failures = 0;
                        s.last_error = None;
                    });
                }
                Ok(PollOutcome::UpToDate) => {
                    self.status.send_modify(|s| {
                        s.state = EngineState::Idle;
                        s.consecutive_failures = 0;
                        s.last_error = None;
                    });
                    if sleep_or_cancel(&self.token, self.settings.poll_interval)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(IndexerError::Shutdown) => break,
                Err(e) => {
                    if self.record_failure(&e).await.is_err() {
                        break;
                    }
                }
            }
        }

        self.status.send_modify(|s| s.state = EngineState::Stopped);
        tracing::info!(chain = %self.chain, "indexer stopped");
    }

    async fn record_failure(&self, error: &IndexerError) -> Result<(), IndexerError> {
        let mut failures = 0;
        self.status.send_modify(|s| {
            s.consecutive_failures = s.consecutive_failures.saturating_add(1);
            s.last_error = Some(error.to_string());
            failures = s.consecutive_failures;
        });
        tracing::error!(
            chain = %self.chain,
            consecutive_failures = failures,
            error = %error,
            "indexer iteration failed"
        );
        sleep_or_cancel(&self.token, self.settings.failure_cooldown).await
    }

    /// Performs one iteration: read cursor and head, sync pools, index the
    /// next batch if any.
    ///
    /// # Errors
    ///
    /// Returns the head query error, a persistence error, or the last error
    /// of an exhausted batch retry.
    pub async fn poll_once(&self) -> Result<PollOutcome, IndexerError> {
        let last = self.cursor().await?;
        let head = self.client.get_block_number().await?;
        self.status.send_modify(|s| {
            s.chain_head = Some(head);
            s.last_processed = Some(last);
        });

        let Some(range) = next_range(last, head, self.settings.batch_size) else {
            return Ok(PollOutcome::UpToDate);
        };
        self.status.send_modify(|s| s.state = EngineState::CatchingUp);

        sync_pools(self.client.as_ref(), self.store.as_ref()).await?;
        let events = self.index_block_range(range).await?;
        Ok(PollOutcome::Indexed { range, events })
    }

    async fn cursor(&self) -> Result<u64, IndexerError> {
        let mut tx = self.store.begin().await?;
        let state = tx.indexer_state(&self.chain).await;
        discard(tx, &self.chain).await;
        state?
            .map(|s| s.last_block_number)
            .ok_or_else(|| IndexerError::Persistence(format!("no indexer state for {}", self.chain)))
    }

    /// Indexes `range` with the retry policy. Returns the number of events
    /// recorded.
    ///
    /// # Errors
    ///
    /// Returns the last attempt's error, or [`IndexerError::Shutdown`] if
    /// stopped during a backoff.
    pub async fn index_block_range(&self, range: BlockRange) -> Result<usize, IndexerError> {
        expected_cursor(range)?;
        self.settings
            .retry
            .run(&self.token, |attempt| async move {
                if attempt > 1 {
                    tracing::info!(chain = %self.chain, %range, attempt, "retrying batch");
                }
                self.index_block_range_once(range).await
            })
            .await
    }

    /// Indexes `range` in a single transaction, without retries.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::InvalidRequest`] for a range starting at
    /// block 0, [`IndexerError::CursorConflict`] if the stored cursor is not
    /// `range.from - 1`, or any persistence error. Nothing is written on
    /// error.
    pub async fn index_block_range_once(&self, range: BlockRange) -> Result<usize, IndexerError> {
        let expected = expected_cursor(range)?;
        let raw_events = self.client.get_all_events(range).await;
        let block_times = self.block_times(&raw_events).await;

        let mut tx = self.store.begin().await?;
        let recorded = match self
            .apply_batch(tx.as_mut(), range, expected, &raw_events, &block_times)
            .await
        {
            Ok(recorded) => recorded,
            Err(e) => {
                discard(tx, &self.chain).await;
                return Err(e);
            }
        };
        tx.commit().await?;

        self.status.send_modify(|s| s.last_processed = Some(range.to));
        tracing::info!(
            chain = %self.chain,
            from = range.from,
            to = range.to,
            blocks = range.block_count(),
            events = recorded,
            "batch committed"
        );
        Ok(recorded)
    }

    async fn block_times(&self, events: &[RawEvent]) -> HashMap<u64, DateTime<Utc>> {
        let mut times = HashMap::new();
        for event in events {
            if times.contains_key(&event.block_number) {
                continue;
            }
            match self.client.get_block(event.block_number).await {
                Some(block) if block.number == event.block_number => {
                    tracing::trace!(chain = %self.chain, block = block.number, hash = %block.hash, "block time resolved");
                    times.insert(event.block_number, block.timestamp);
                }
                Some(block) => tracing::warn!(
                    chain = %self.chain,
                    requested = event.block_number,
                    returned = block.number,
                    "node returned a different block, ignoring its timestamp"
                ),
                None => {}
            }
        }
        times
    }

    async fn apply_batch(
        &self,
        tx: &mut dyn LedgerTx,
        range: BlockRange,
        expected: u64,
        raw_events: &[RawEvent],
        block_times: &HashMap<u64, DateTime<Utc>>,
    ) -> Result<usize, IndexerError> {
        let found = tx
            .indexer_state(&self.chain)
            .await?
            .map(|s| s.last_block_number)
            .ok_or_else(|| {
                IndexerError::Persistence(format!("no indexer state for {}", self.chain))
            })?;
        if found != expected {
            return Err(IndexerError::CursorConflict {
                chain: self.chain.to_string(),
                expected,
                found,
            });
        }

        let mut lock_durations: HashMap<u64, u64> = HashMap::new();
        let mut recorded = 0;
        for raw in raw_events {
            let event = self.to_event(raw, block_times);
            if !tx.insert_event(&event).await? {
                tracing::debug!(chain = %self.chain, tx_hash = %event.tx_hash, log_index = event.log_index, "event already recorded");
                continue;
            }
            recorded += 1;

            let lock = match lock_durations.get(&event.pool_id) {
                Some(lock) => *lock,
                None => {
                    let lock = tx
                        .pool(&self.chain, event.pool_id)
                        .await?
                        .map_or(DEFAULT_LOCK_DURATION_SECS, |p| p.lock_duration_secs);
                    lock_durations.insert(event.pool_id, lock);
                    lock
                }
            };

            let existing = tx
                .stake(&self.chain, event.pool_id, &event.user_address)
                .await?;
            match apply_event(existing, &event, lock) {
                Some(stake) => tx.upsert_stake(&stake).await?,
                None => tracing::debug!(
                    chain = %self.chain,
                    kind = %event.kind,
                    pool_id = event.pool_id,
                    user = %event.user_address,
                    "event for unknown position"
                ),
            }
        }

        tx.advance_cursor(&self.chain, expected, range.to).await?;
        Ok(recorded)
    }

    fn to_event(&self, raw: &RawEvent, block_times: &HashMap<u64, DateTime<Utc>>) -> StakingEvent {
        let timestamp = block_times
            .get(&raw.block_number)
            .copied()
            .or_else(|| {
                raw.emitted_at
                    .and_then(|secs| i64::try_from(secs).ok())
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
            })
            .unwrap_or_else(Utc::now);
        StakingEvent {
            chain: self.chain.clone(),
            kind: raw.kind,
            tx_hash: raw.tx_hash.clone(),
            block_number: raw.block_number,
            log_index: raw.log_index,
            pool_id: raw.pool_id,
            user_address: raw.user_address.clone(),
            amount: raw.amount,
            reward_amount: raw.reward_amount,
            penalty: raw.penalty,
            timestamp,
        }
    }
}

async fn discard(tx: Box<dyn LedgerTx>, chain: &ChainId) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(chain = %chain, error = %e, "rollback failed");
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::chain::mock::{MockChainClient, pool_snapshot, raw_event};
    use crate::domain::{EventKind, U256};
    use crate::persistence::{EventFilter, LedgerReader, MemoryLedger, Page};

    const USER: &str = "0xabababababababababababababababababababab";

    struct Harness {
        client: Arc<MockChainClient>,
        ledger: MemoryLedger,
        engine: IndexerEngine,
    }

    fn harness(start_block: u64, batch_size: u64) -> Harness {
        let client = Arc::new(MockChainClient::new("sepolia"));
        let ledger = MemoryLedger::new();
        let settings = EngineSettings {
            batch_size,
            start_block,
            ..EngineSettings::default()
        };
        let engine = IndexerEngine::new(
            Arc::clone(&client) as Arc<dyn ChainClient>,
            Arc::new(ledger.clone()),
            settings,
            CancellationToken::new(),
        );
        Harness {
            client,
            ledger,
            engine,
        }
    }

    fn chain() -> ChainId {
        ChainId::new("sepolia")
    }

    fn range(from: u64, to: u64) -> BlockRange {
        let Some(range) = BlockRange::new(from, to) else {
            panic!("valid range {from}..={to}");
        };
        range
    }

    fn event(kind: EventKind, block: u64, log_index: u64, amount: u64) -> RawEvent {
        RawEvent {
            amount: Some(U256::from(amount)),
            ..raw_event(kind, block, log_index)
        }
    }

    async fn stake_of(ledger: &MemoryLedger) -> Option<crate::domain::Stake> {
        let Ok(mut tx) = ledger.begin().await else {
            panic!("begin");
        };
        let Ok(stake) = tx.stake(&chain(), 0, USER).await else {
            panic!("read stake");
        };
        stake
    }

    async fn cursor_of(ledger: &MemoryLedger) -> u64 {
        let Ok(Some(state)) = LedgerReader::indexer_state(ledger, &chain()).await else {
            panic!("cursor exists");
        };
        state.last_block_number
    }

    #[test]
    fn next_range_holds_back_newest_block_and_caps_batch() {
        assert_eq!(next_range(100, 250, 50), BlockRange::new(101, 150));
        assert_eq!(next_range(100, 120, 50), BlockRange::new(101, 119));
        assert_eq!(next_range(100, 101, 50), None);
        assert_eq!(next_range(100, 100, 50), None);
        assert_eq!(next_range(0, 0, 50), None);
        assert_eq!(next_range(7, 20, 0), BlockRange::new(8, 8));
    }

    #[tokio::test]
    async fn initialize_creates_cursor_once() {
        let h = harness(100, 50);
        let Ok(state) = h.engine.initialize().await else {
            panic!("initialize");
        };
        assert_eq!(state.last_block_number, 100);

        let Ok(again) = h.engine.initialize().await else {
            panic!("second initialize");
        };
        assert_eq!(again.last_block_number, 100);
        assert_eq!(h.engine.subscribe().borrow().last_processed, Some(100));
    }

    #[tokio::test]
    async fn poll_advances_cursor_by_one_batch() {
        let h = harness(100, 50);
        h.client.set_head(250);
        let Ok(_) = h.engine.initialize().await else {
            panic!("initialize");
        };

        let Ok(outcome) = h.engine.poll_once().await else {
            panic!("poll");
        };
        assert_eq!(
            outcome,
            PollOutcome::Indexed {
                range: range(101, 150),
                events: 0
            }
        );
        assert_eq!(cursor_of(&h.ledger).await, 150);

        let Ok(PollOutcome::Indexed { range: next, .. }) = h.engine.poll_once().await else {
            panic!("second poll indexes");
        };
        assert_eq!(next, range(151, 200));
    }

    #[tokio::test]
    async fn poll_reports_up_to_date_at_safe_head() {
        let h = harness(100, 50);
        h.client.set_head(101);
        let Ok(_) = h.engine.initialize().await else {
            panic!("initialize");
        };
        let Ok(PollOutcome::UpToDate) = h.engine.poll_once().await else {
            panic!("nothing to index");
        };
        assert_eq!(cursor_of(&h.ledger).await, 100);
    }

    #[tokio::test]
    async fn batch_applies_events_in_emission_order() {
        let h = harness(0, 100);
        h.client.push_event(event(EventKind::Withdrawn, 5, 2, 100));
        h.client.push_event(event(EventKind::Staked, 7, 0, 30));
        h.client.push_event(event(EventKind::Staked, 5, 1, 100));
        let Ok(_) = h.engine.initialize().await else {
            panic!("initialize");
        };

        let Ok(3) = h.engine.index_block_range_once(range(1, 10)).await else {
            panic!("three events recorded");
        };
        let Some(stake) = stake_of(&h.ledger).await else {
            panic!("stake exists");
        };
        assert_eq!(stake.staked_amount, U256::from(30));
        assert!(stake.is_active);

        let Ok(page) = h
            .ledger
            .list_events(&EventFilter::new(chain()), Page::default())
            .await
        else {
            panic!("list events");
        };
        let keys: Vec<(u64, u64)> = page
            .items
            .iter()
            .map(|e| (e.block_number, e.log_index))
            .collect();
        assert_eq!(keys, [(7, 0), (5, 2), (5, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_commit_then_retry_does_not_double_count() {
        let h = harness(0, 100);
        h.client.push_event(event(EventKind::Staked, 3, 0, 100));
        let Ok(_) = h.engine.initialize().await else {
            panic!("initialize");
        };
        h.ledger.fail_next_commits(1);

        let Ok(1) = h.engine.index_block_range(range(1, 10)).await else {
            panic!("second attempt commits");
        };
        let Some(stake) = stake_of(&h.ledger).await else {
            panic!("stake exists");
        };
        assert_eq!(stake.staked_amount, U256::from(100));
        assert_eq!(cursor_of(&h.ledger).await, 10);

        let Ok(page) = h
            .ledger
            .list_events(&EventFilter::new(chain()), Page::default())
            .await
        else {
            panic!("list events");
        };
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn failing_kind_only_drops_its_own_events() {
        let h = harness(0, 100);
        h.client.push_event(event(EventKind::Staked, 2, 0, 100));
        h.client.push_event(event(EventKind::Withdrawn, 3, 0, 40));
        h.client.push_event(RawEvent {
            reward_amount: Some(U256::from(9)),
            ..event(EventKind::RewardClaimed, 4, 0, 0)
        });
        h.client.fail_kind(EventKind::Withdrawn);
        let Ok(_) = h.engine.initialize().await else {
            panic!("initialize");
        };

        let Ok(2) = h.engine.index_block_range_once(range(1, 10)).await else {
            panic!("staked and reward claim recorded");
        };
        let Some(stake) = stake_of(&h.ledger).await else {
            panic!("stake exists");
        };
        assert_eq!(stake.staked_amount, U256::from(100));
        assert_eq!(h.client.event_queries(), 4);
    }

    #[tokio::test]
    async fn cursor_mismatch_rejects_batch() {
        let h = harness(100, 50);
        h.client.push_event(event(EventKind::Staked, 125, 0, 1));
        let Ok(_) = h.engine.initialize().await else {
            panic!("initialize");
        };

        let result = h.engine.index_block_range_once(range(120, 130)).await;
        assert!(matches!(
            result,
            Err(IndexerError::CursorConflict {
                expected: 119,
                found: 100,
                ..
            })
        ));
        assert!(stake_of(&h.ledger).await.is_none());
        assert_eq!(cursor_of(&h.ledger).await, 100);
    }

    #[tokio::test]
    async fn range_from_genesis_is_rejected_without_writes() {
        let h = harness(0, 50);
        h.client.push_event(event(EventKind::Staked, 3, 0, 1));
        let Ok(_) = h.engine.initialize().await else {
            panic!("initialize");
        };

        let once = h.engine.index_block_range_once(range(0, 5)).await;
        assert!(matches!(once, Err(IndexerError::InvalidRequest(_))));
        let retried = h.engine.index_block_range(range(0, 5)).await;
        assert!(matches!(retried, Err(IndexerError::InvalidRequest(_))));
        assert_eq!(h.client.event_queries(), 0);
        assert!(stake_of(&h.ledger).await.is_none());
        assert_eq!(cursor_of(&h.ledger).await, 0);
    }

    #[tokio::test]
    async fn lock_duration_comes_from_pool_or_defaults() {
        let h = harness(0, 100);
        h.client.set_block_time(4, 1_700_000_000);
        h.client.push_event(event(EventKind::Staked, 4, 0, 1));
        let Ok(_) = h.engine.initialize().await else {
            panic!("initialize");
        };
        let Ok(_) = h.engine.index_block_range_once(range(1, 10)).await else {
            panic!("batch");
        };
        let Some(stake) = stake_of(&h.ledger).await else {
            panic!("stake exists");
        };
        let Some(staked_at) = DateTime::from_timestamp(1_700_000_000, 0) else {
            panic!("valid timestamp");
        };
        assert_eq!(stake.last_stake_time, Some(staked_at));
        assert_eq!(
            stake.unlock_time,
            DateTime::from_timestamp(1_700_000_000 + 604_800, 0)
        );

        h.client.put_pool(pool_snapshot(0, 60));
        h.client.set_head(30);
        h.client.set_block_time(15, 1_700_000_100);
        h.client.push_event(event(EventKind::Staked, 15, 0, 1));
        let Ok(PollOutcome::Indexed { .. }) = h.engine.poll_once().await else {
            panic!("poll indexes");
        };
        let Some(stake) = stake_of(&h.ledger).await else {
            panic!("stake exists");
        };
        assert_eq!(stake.staked_amount, U256::from(2));
        assert_eq!(stake.unlock_time, DateTime::from_timestamp(1_700_000_160, 0));
    }

    #[tokio::test]
    async fn timestamp_falls_back_to_event_argument() {
        let h = harness(0, 100);
        h.client.push_event(RawEvent {
            emitted_at: Some(1_650_000_000),
            ..event(EventKind::Staked, 6, 0, 5)
        });
        let Ok(_) = h.engine.initialize().await else {
            panic!("initialize");
        };
        let Ok(_) = h.engine.index_block_range_once(range(1, 10)).await else {
            panic!("batch");
        };
        let Some(stake) = stake_of(&h.ledger).await else {
            panic!("stake exists");
        };
        assert_eq!(
            stake.last_stake_time,
            DateTime::from_timestamp(1_650_000_000, 0)
        );
    }

    #[tokio::test]
    async fn misnumbered_block_header_is_not_trusted() {
        let h = harness(0, 100);
        h.client.set_block_time(6, 1_700_000_000);
        h.client.misnumber_block(6, 7);
        h.client.push_event(RawEvent {
            emitted_at: Some(1_650_000_000),
            ..event(EventKind::Staked, 6, 0, 5)
        });
        let Ok(_) = h.engine.initialize().await else {
            panic!("initialize");
        };
        let Ok(_) = h.engine.index_block_range_once(range(1, 10)).await else {
            panic!("batch");
        };
        let Some(stake) = stake_of(&h.ledger).await else {
            panic!("stake exists");
        };
        assert_eq!(
            stake.last_stake_time,
            DateTime::from_timestamp(1_650_000_000, 0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_wakes_idle_engine() {
        let h = harness(0, 100);
        h.client.set_head(1);
        let mut status = h.engine.subscribe();
        let token = h.engine.token.clone();
        let handle = tokio::spawn(h.engine.run());

        let Ok(_) = status.wait_for(|s| s.state == EngineState::Idle).await else {
            panic!("engine reaches idle");
        };
        let started = tokio::time::Instant::now();
        token.cancel();
        let Ok(()) = handle.await else {
            panic!("engine task joins");
        };
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(status.borrow().state, EngineState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn head_failures_are_counted_and_recovered() {
        let h = harness(0, 100);
        h.client.set_head_unavailable(true);
        let mut status = h.engine.subscribe();
        let token = h.engine.token.clone();
        let client = Arc::clone(&h.client);
        let handle = tokio::spawn(h.engine.run());

        let Ok(_) = status.wait_for(|s| s.consecutive_failures >= 2).await else {
            panic!("failures are counted");
        };
        assert!(status.borrow().last_error.is_some());

        client.set_head_unavailable(false);
        client.set_head(5);
        let Ok(_) = status
            .wait_for(|s| s.state == EngineState::Idle && s.consecutive_failures == 0)
            .await
        else {
            panic!("engine recovers");
        };
        assert_eq!(status.borrow().last_processed, Some(4));

        token.cancel();
        let Ok(()) = handle.await else {
            panic!("engine task joins");
        };
    }
}
