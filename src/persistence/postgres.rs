//! PostgreSQL implementation of the persistence layer.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use super::models::RECENT_EVENTS;
use super::{
    EventFilter, LedgerReader, LedgerStore, LedgerTx, Page, Paged, PoolStats, ProtocolStats,
    StakeFilter,
};
use crate::config::DatabaseConfig;
use crate::domain::amount::parse_optional_amount;
use crate::domain::{
    ChainId, EventKind, IndexerState, Pool, Stake, StakingEvent, format_amount, parse_amount,
};
use crate::error::IndexerError;

const POOL_COLUMNS: &str = "chain, pool_id, staking_token, reward_token, reward_rate, \
     lock_duration, deposit_fee, withdraw_fee, is_active, total_staked, apy, created_at, updated_at";

const STAKE_COLUMNS: &str = "chain, pool_id, user_address, staked_amount, pending_rewards, \
     last_stake_time, unlock_time, is_active, updated_at";

const EVENT_COLUMNS: &str = "chain, event_type, tx_hash, block_number, log_index, pool_id, \
     user_address, amount, reward_amount, penalty, timestamp";

const EVENT_FILTER: &str = "WHERE chain = $1 \
     AND ($2::text IS NULL OR event_type = $2) \
     AND ($3::bigint IS NULL OR pool_id = $3) \
     AND ($4::text IS NULL OR user_address = $4) \
     AND ($5::bigint IS NULL OR block_number >= $5) \
     AND ($6::bigint IS NULL OR block_number <= $6) \
     AND ($7::timestamptz IS NULL OR timestamp >= $7) \
     AND ($8::timestamptz IS NULL OR timestamp <= $8)";

const STAKE_FILTER: &str = "WHERE chain = $1 \
     AND ($2::text IS NULL OR user_address = $2) \
     AND ($3::bigint IS NULL OR pool_id = $3) \
     AND (NOT $4 OR is_active)";

fn db_err(e: sqlx::Error) -> IndexerError {
    IndexerError::Persistence(e.to_string())
}

fn to_db(value: u64, what: &str) -> Result<i64, IndexerError> {
    i64::try_from(value)
        .map_err(|_| IndexerError::Persistence(format!("{what} {value} exceeds BIGINT")))
}

fn from_db(value: i64, what: &str) -> Result<u64, IndexerError> {
    u64::try_from(value).map_err(|_| IndexerError::Decode(format!("negative {what}: {value}")))
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

#[derive(Debug, sqlx::FromRow)]
struct StateRow {
    chain: String,
    last_block_number: i64,
    is_syncing: bool,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StateRow> for IndexerState {
    type Error = IndexerError;

    fn try_from(row: StateRow) -> Result<Self, Self::Error> {
        Ok(Self {
            chain: ChainId::new(&row.chain),
            last_block_number: from_db(row.last_block_number, "last_block_number")?,
            is_syncing: row.is_syncing,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PoolRow {
    chain: String,
    pool_id: i64,
    staking_token: String,
    reward_token: String,
    reward_rate: String,
    lock_duration: i64,
    deposit_fee: i32,
    withdraw_fee: i32,
    is_active: bool,
    total_staked: String,
    apy: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PoolRow> for Pool {
    type Error = IndexerError;

    fn try_from(row: PoolRow) -> Result<Self, Self::Error> {
        Ok(Self {
            chain: ChainId::new(&row.chain),
            pool_id: from_db(row.pool_id, "pool_id")?,
            staking_token: row.staking_token,
            reward_token: row.reward_token,
            reward_rate: parse_amount(&row.reward_rate)?,
            lock_duration_secs: from_db(row.lock_duration, "lock_duration")?,
            deposit_fee_bps: u32::try_from(row.deposit_fee)
                .map_err(|_| IndexerError::Decode(format!("deposit_fee {}", row.deposit_fee)))?,
            withdraw_fee_bps: u32::try_from(row.withdraw_fee)
                .map_err(|_| IndexerError::Decode(format!("withdraw_fee {}", row.withdraw_fee)))?,
            is_active: row.is_active,
            total_staked: parse_amount(&row.total_staked)?,
            apy: parse_amount(&row.apy)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StakeRow {
    chain: String,
    pool_id: i64,
    user_address: String,
    staked_amount: String,
    pending_rewards: String,
    last_stake_time: Option<DateTime<Utc>>,
    unlock_time: Option<DateTime<Utc>>,
    is_active: bool,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StakeRow> for Stake {
    type Error = IndexerError;

    fn try_from(row: StakeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            chain: ChainId::new(&row.chain),
            pool_id: from_db(row.pool_id, "pool_id")?,
            user_address: row.user_address,
            staked_amount: parse_amount(&row.staked_amount)?,
            pending_rewards: parse_amount(&row.pending_rewards)?,
            last_stake_time: row.last_stake_time,
            unlock_time: row.unlock_time,
            is_active: row.is_active,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    chain: String,
    event_type: String,
    tx_hash: String,
    block_number: i64,
    log_index: i64,
    pool_id: i64,
    user_address: String,
    amount: Option<String>,
    reward_amount: Option<String>,
    penalty: Option<String>,
    timestamp: DateTime<Utc>,
}

impl TryFrom<EventRow> for StakingEvent {
    type Error = IndexerError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let kind: EventKind = row
            .event_type
            .parse()
            .map_err(|_| IndexerError::Decode(format!("unknown event_type {}", row.event_type)))?;
        Ok(Self {
            chain: ChainId::new(&row.chain),
            kind,
            tx_hash: row.tx_hash,
            block_number: from_db(row.block_number, "block_number")?,
            log_index: from_db(row.log_index, "log_index")?,
            pool_id: from_db(row.pool_id, "pool_id")?,
            user_address: row.user_address,
            amount: parse_optional_amount(row.amount.as_deref())?,
            reward_amount: parse_optional_amount(row.reward_amount.as_deref())?,
            penalty: parse_optional_amount(row.penalty.as_deref())?,
            timestamp: row.timestamp,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, IndexerError>
where
    T: TryFrom<R, Error = IndexerError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// PostgreSQL-backed ledger using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Wraps an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Persistence`] if the database is unreachable
    /// or a migration fails.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, IndexerError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(db_err)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| IndexerError::Persistence(format!("migration failed: {e}")))?;

        Ok(Self::new(pool))
    }

    async fn fetch_events(
        &self,
        filter: &EventFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StakingEvent>, IndexerError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM staking_events {EVENT_FILTER} \
             ORDER BY block_number DESC, log_index DESC LIMIT $9 OFFSET $10"
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(filter.chain.as_str())
            .bind(filter.kind.map(|k| k.as_str()))
            .bind(filter.pool_id.map(|id| to_db(id, "pool_id")).transpose()?)
            .bind(filter.user_address.as_deref())
            .bind(filter.from_block.map(|b| to_db(b, "from_block")).transpose()?)
            .bind(filter.to_block.map(|b| to_db(b, "to_block")).transpose()?)
            .bind(filter.from_time)
            .bind(filter.to_time)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        convert_all(rows)
    }

    async fn count_events(&self, filter: &EventFilter) -> Result<u64, IndexerError> {
        let sql = format!("SELECT COUNT(*) FROM staking_events {EVENT_FILTER}");
        let total = sqlx::query_scalar::<_, i64>(&sql)
            .bind(filter.chain.as_str())
            .bind(filter.kind.map(|k| k.as_str()))
            .bind(filter.pool_id.map(|id| to_db(id, "pool_id")).transpose()?)
            .bind(filter.user_address.as_deref())
            .bind(filter.from_block.map(|b| to_db(b, "from_block")).transpose()?)
            .bind(filter.to_block.map(|b| to_db(b, "to_block")).transpose()?)
            .bind(filter.from_time)
            .bind(filter.to_time)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count(total))
    }
}

fn page_bounds(page: Page) -> Result<(i64, i64), IndexerError> {
    Ok((to_db(page.limit, "limit")?, to_db(page.offset, "offset")?))
}

#[async_trait]
impl LedgerStore for PostgresLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, IndexerError> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(PgLedgerTx { tx }))
    }
}

struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

impl fmt::Debug for PgLedgerTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgLedgerTx").finish_non_exhaustive()
    }
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn indexer_state(
        &mut self,
        chain: &ChainId,
    ) -> Result<Option<IndexerState>, IndexerError> {
        sqlx::query_as::<_, StateRow>(
            "SELECT chain, last_block_number, is_syncing, updated_at FROM indexer_state \
             WHERE chain = $1 FOR UPDATE",
        )
        .bind(chain.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?
        .map(IndexerState::try_from)
        .transpose()
    }

    async fn insert_indexer_state(&mut self, state: &IndexerState) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO indexer_state (chain, last_block_number, is_syncing, updated_at) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (chain) DO NOTHING",
        )
        .bind(state.chain.as_str())
        .bind(to_db(state.last_block_number, "last_block_number")?)
        .bind(state.is_syncing)
        .bind(state.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn advance_cursor(
        &mut self,
        chain: &ChainId,
        expected: u64,
        to: u64,
    ) -> Result<(), IndexerError> {
        let conflict = |found: u64| IndexerError::CursorConflict {
            chain: chain.to_string(),
            expected,
            found,
        };
        if to < expected {
            return Err(conflict(expected));
        }

        let updated = sqlx::query(
            "UPDATE indexer_state SET last_block_number = $3, is_syncing = FALSE, updated_at = now() \
             WHERE chain = $1 AND last_block_number = $2",
        )
        .bind(chain.as_str())
        .bind(to_db(expected, "expected")?)
        .bind(to_db(to, "to")?)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?
        .rows_affected();

        if updated == 1 {
            return Ok(());
        }
        match self.indexer_state(chain).await? {
            Some(state) => Err(conflict(state.last_block_number)),
            None => Err(IndexerError::Persistence(format!(
                "no indexer state for {chain}"
            ))),
        }
    }

    async fn pool(&mut self, chain: &ChainId, pool_id: u64) -> Result<Option<Pool>, IndexerError> {
        let sql = format!("SELECT {POOL_COLUMNS} FROM pools WHERE chain = $1 AND pool_id = $2");
        sqlx::query_as::<_, PoolRow>(&sql)
            .bind(chain.as_str())
            .bind(to_db(pool_id, "pool_id")?)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?
            .map(Pool::try_from)
            .transpose()
    }

    async fn upsert_pool(&mut self, pool: &Pool) -> Result<(), IndexerError> {
        let sql = format!(
            "INSERT INTO pools ({POOL_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (chain, pool_id) DO UPDATE SET \
             staking_token = EXCLUDED.staking_token, reward_token = EXCLUDED.reward_token, \
             reward_rate = EXCLUDED.reward_rate, lock_duration = EXCLUDED.lock_duration, \
             deposit_fee = EXCLUDED.deposit_fee, withdraw_fee = EXCLUDED.withdraw_fee, \
             is_active = EXCLUDED.is_active, total_staked = EXCLUDED.total_staked, \
             apy = EXCLUDED.apy, updated_at = EXCLUDED.updated_at"
        );
        let fee = |bps: u32| {
            i32::try_from(bps).map_err(|_| IndexerError::Persistence(format!("fee {bps} bps")))
        };
        sqlx::query(&sql)
            .bind(pool.chain.as_str())
            .bind(to_db(pool.pool_id, "pool_id")?)
            .bind(&pool.staking_token)
            .bind(&pool.reward_token)
            .bind(format_amount(pool.reward_rate))
            .bind(to_db(pool.lock_duration_secs, "lock_duration")?)
            .bind(fee(pool.deposit_fee_bps)?)
            .bind(fee(pool.withdraw_fee_bps)?)
            .bind(pool.is_active)
            .bind(format_amount(pool.total_staked))
            .bind(format_amount(pool.apy))
            .bind(pool.created_at)
            .bind(pool.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn stake(
        &mut self,
        chain: &ChainId,
        pool_id: u64,
        user_address: &str,
    ) -> Result<Option<Stake>, IndexerError> {
        let sql = format!(
            "SELECT {STAKE_COLUMNS} FROM stakes \
             WHERE chain = $1 AND pool_id = $2 AND user_address = $3"
        );
        sqlx::query_as::<_, StakeRow>(&sql)
            .bind(chain.as_str())
            .bind(to_db(pool_id, "pool_id")?)
            .bind(user_address)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?
            .map(Stake::try_from)
            .transpose()
    }

    async fn upsert_stake(&mut self, stake: &Stake) -> Result<(), IndexerError> {
        let sql = format!(
            "INSERT INTO stakes ({STAKE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (chain, pool_id, user_address) DO UPDATE SET \
             staked_amount = EXCLUDED.staked_amount, pending_rewards = EXCLUDED.pending_rewards, \
             last_stake_time = EXCLUDED.last_stake_time, unlock_time = EXCLUDED.unlock_time, \
             is_active = EXCLUDED.is_active, updated_at = EXCLUDED.updated_at"
        );
        sqlx::query(&sql)
            .bind(stake.chain.as_str())
            .bind(to_db(stake.pool_id, "pool_id")?)
            .bind(&stake.user_address)
            .bind(format_amount(stake.staked_amount))
            .bind(format_amount(stake.pending_rewards))
            .bind(stake.last_stake_time)
            .bind(stake.unlock_time)
            .bind(stake.is_active)
            .bind(stake.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_event(&mut self, event: &StakingEvent) -> Result<bool, IndexerError> {
        let sql = format!(
            "INSERT INTO staking_events ({EVENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (chain, tx_hash, log_index) DO NOTHING"
        );
        let inserted = sqlx::query(&sql)
            .bind(event.chain.as_str())
            .bind(event.kind.as_str())
            .bind(&event.tx_hash)
            .bind(to_db(event.block_number, "block_number")?)
            .bind(to_db(event.log_index, "log_index")?)
            .bind(to_db(event.pool_id, "pool_id")?)
            .bind(&event.user_address)
            .bind(event.amount.map(format_amount))
            .bind(event.reward_amount.map(format_amount))
            .bind(event.penalty.map(format_amount))
            .bind(event.timestamp)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?
            .rows_affected();
        Ok(inserted == 1)
    }

    async fn commit(self: Box<Self>) -> Result<(), IndexerError> {
        self.tx.commit().await.map_err(db_err)
    }

    async fn rollback(self: Box<Self>) -> Result<(), IndexerError> {
        self.tx.rollback().await.map_err(db_err)
    }
}

#[async_trait]
impl LedgerReader for PostgresLedger {
    async fn list_pools(
        &self,
        chain: &ChainId,
        active_only: bool,
        page: Page,
    ) -> Result<Paged<Pool>, IndexerError> {
        let (limit, offset) = page_bounds(page)?;
        let sql = format!(
            "SELECT {POOL_COLUMNS} FROM pools WHERE chain = $1 AND (NOT $2 OR is_active) \
             ORDER BY pool_id LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query_as::<_, PoolRow>(&sql)
            .bind(chain.as_str())
            .bind(active_only)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM pools WHERE chain = $1 AND (NOT $2 OR is_active)",
        )
        .bind(chain.as_str())
        .bind(active_only)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Paged {
            items: convert_all(rows)?,
            total: count(total),
        })
    }

    async fn get_pool(&self, chain: &ChainId, pool_id: u64) -> Result<Option<Pool>, IndexerError> {
        let sql = format!("SELECT {POOL_COLUMNS} FROM pools WHERE chain = $1 AND pool_id = $2");
        sqlx::query_as::<_, PoolRow>(&sql)
            .bind(chain.as_str())
            .bind(to_db(pool_id, "pool_id")?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(Pool::try_from)
            .transpose()
    }

    async fn list_stakes(
        &self,
        filter: &StakeFilter,
        page: Page,
    ) -> Result<Paged<Stake>, IndexerError> {
        let (limit, offset) = page_bounds(page)?;
        let pool_id = filter.pool_id.map(|id| to_db(id, "pool_id")).transpose()?;

        let sql = format!(
            "SELECT {STAKE_COLUMNS} FROM stakes {STAKE_FILTER} \
             ORDER BY pool_id, user_address LIMIT $5 OFFSET $6"
        );
        let rows = sqlx::query_as::<_, StakeRow>(&sql)
            .bind(filter.chain.as_str())
            .bind(filter.user_address.as_deref())
            .bind(pool_id)
            .bind(filter.active_only)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let sql = format!("SELECT COUNT(*) FROM stakes {STAKE_FILTER}");
        let total = sqlx::query_scalar::<_, i64>(&sql)
            .bind(filter.chain.as_str())
            .bind(filter.user_address.as_deref())
            .bind(pool_id)
            .bind(filter.active_only)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(Paged {
            items: convert_all(rows)?,
            total: count(total),
        })
    }

    async fn list_events(
        &self,
        filter: &EventFilter,
        page: Page,
    ) -> Result<Paged<StakingEvent>, IndexerError> {
        let (limit, offset) = page_bounds(page)?;
        Ok(Paged {
            items: self.fetch_events(filter, limit, offset).await?,
            total: self.count_events(filter).await?,
        })
    }

    async fn protocol_stats(&self, chain: &ChainId) -> Result<ProtocolStats, IndexerError> {
        let (total_pools, active_pools) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE is_active) FROM pools WHERE chain = $1",
        )
        .bind(chain.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let (unique_stakers, total_staked) = sqlx::query_as::<_, (i64, String)>(
            "SELECT COUNT(DISTINCT user_address), \
             COALESCE(SUM(staked_amount::numeric), 0)::text \
             FROM stakes WHERE chain = $1 AND is_active",
        )
        .bind(chain.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let (total_events, rewards) = sqlx::query_as::<_, (i64, String)>(
            "SELECT COUNT(*), \
             COALESCE(SUM(reward_amount::numeric) \
                 FILTER (WHERE event_type IN ('Withdrawn', 'RewardClaimed')), 0)::text \
             FROM staking_events WHERE chain = $1",
        )
        .bind(chain.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(ProtocolStats {
            total_pools: count(total_pools),
            active_pools: count(active_pools),
            unique_stakers: count(unique_stakers),
            total_staked: parse_amount(&total_staked)?,
            total_rewards_distributed: parse_amount(&rewards)?,
            total_events: count(total_events),
        })
    }

    async fn pool_stats(
        &self,
        chain: &ChainId,
        pool_id: u64,
    ) -> Result<Option<PoolStats>, IndexerError> {
        if self.get_pool(chain, pool_id).await?.is_none() {
            return Ok(None);
        }

        let (unique_stakers, total_staked) = sqlx::query_as::<_, (i64, String)>(
            "SELECT COUNT(DISTINCT user_address), \
             COALESCE(SUM(staked_amount::numeric), 0)::text \
             FROM stakes WHERE chain = $1 AND pool_id = $2 AND is_active",
        )
        .bind(chain.as_str())
        .bind(to_db(pool_id, "pool_id")?)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let mut filter = EventFilter::new(chain.clone());
        filter.pool_id = Some(pool_id);
        let recent_events = self
            .fetch_events(&filter, to_db(RECENT_EVENTS, "limit")?, 0)
            .await?;

        Ok(Some(PoolStats {
            pool_id,
            unique_stakers: count(unique_stakers),
            total_staked: parse_amount(&total_staked)?,
            recent_events,
        }))
    }

    async fn indexer_state(&self, chain: &ChainId) -> Result<Option<IndexerState>, IndexerError> {
        sqlx::query_as::<_, StateRow>(
            "SELECT chain, last_block_number, is_syncing, updated_at FROM indexer_state \
             WHERE chain = $1",
        )
        .bind(chain.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .map(IndexerState::try_from)
        .transpose()
    }
}
