//! Mirrors the contract's pool list into the ledger.

use chrono::Utc;

use crate::chain::{ChainClient, PoolSnapshot};
use crate::domain::{ChainId, Pool};
use crate::error::IndexerError;
use crate::persistence::{LedgerStore, LedgerTx};

/// Fetches every pool `0..pool_count` and upserts it in one transaction.
///
/// Pools the chain cannot describe right now are skipped. Returns the
/// number of rows written.
///
/// # Errors
///
/// Returns [`IndexerError::Persistence`] if the transaction fails; nothing
/// is written in that case.
pub async fn sync_pools(
    client: &dyn ChainClient,
    store: &dyn LedgerStore,
) -> Result<usize, IndexerError> {
    let chain = client.chain().clone();
    let count = client.get_pool_count().await;

    let mut snapshots = Vec::new();
    for pool_id in 0..count {
        match client.get_pool_info(pool_id).await {
            Some(snapshot) => snapshots.push(snapshot),
            None => tracing::debug!(chain = %chain, pool_id, "pool unavailable, skipping"),
        }
    }
    if snapshots.is_empty() {
        return Ok(0);
    }

    let mut tx = store.begin().await?;
    match write_pools(tx.as_mut(), &chain, &snapshots).await {
        Ok(()) => {
            tx.commit().await?;
            tracing::debug!(chain = %chain, pools = snapshots.len(), "pools synced");
            Ok(snapshots.len())
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(chain = %chain, error = %rollback, "pool sync rollback failed");
            }
            Err(e)
        }
    }
}

async fn write_pools(
    tx: &mut dyn LedgerTx,
    chain: &ChainId,
    snapshots: &[PoolSnapshot],
) -> Result<(), IndexerError> {
    let now = Utc::now();
    for snapshot in snapshots {
        let created_at = tx
            .pool(chain, snapshot.pool_id)
            .await?
            .map_or(now, |existing| existing.created_at);
        tx.upsert_pool(&Pool {
            chain: chain.clone(),
            pool_id: snapshot.pool_id,
            staking_token: snapshot.staking_token.clone(),
            reward_token: snapshot.reward_token.clone(),
            reward_rate: snapshot.reward_rate,
            lock_duration_secs: snapshot.lock_duration_secs,
            deposit_fee_bps: snapshot.deposit_fee_bps,
            withdraw_fee_bps: snapshot.withdraw_fee_bps,
            is_active: snapshot.is_active,
            total_staked: snapshot.total_staked,
            apy: snapshot.apy,
            created_at,
            updated_at: now,
        })
        .await?;
    }
    Ok(())
}
