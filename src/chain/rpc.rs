//! JSON-RPC implementation of [`ChainClient`] over an alloy provider.

use std::fmt;

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use chrono::DateTime;

use super::contract::IStakeFlowStaking::{
    self, EmergencyWithdrawn, IStakeFlowStakingInstance, RewardClaimed, Staked, Withdrawn,
};
use super::{
    BlockInfo, BlockRange, ChainClient, PoolSnapshot, RawEvent, ReceiptSummary, UserSnapshot,
    format_address, format_hash,
};
use crate::config::ChainConfig;
use crate::domain::{ChainId, EventKind};
use crate::error::IndexerError;

/// [`ChainClient`] backed by an HTTP JSON-RPC endpoint.
#[derive(Clone)]
pub struct EvmChainClient {
    chain: ChainId,
    contract_address: Address,
    provider: DynProvider,
    contract: IStakeFlowStakingInstance<DynProvider>,
}

impl fmt::Debug for EvmChainClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmChainClient")
            .field("chain", &self.chain)
            .field("contract_address", &self.contract_address)
            .finish_non_exhaustive()
    }
}

impl EvmChainClient {
    /// Connects to the chain's RPC endpoint and verifies it answers.
    ///
    /// A chain id that differs from the configured one is logged but not
    /// rejected.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Connection`] if the endpoint is malformed or
    /// does not answer a block number query.
    pub async fn connect(config: &ChainConfig) -> Result<Self, IndexerError> {
        let connection_error = |reason: String| IndexerError::Connection {
            chain: config.name.to_string(),
            reason,
        };

        let contract_address: Address = config
            .staking_contract
            .parse()
            .map_err(|e| connection_error(format!("invalid staking contract address: {e}")))?;

        let provider = ProviderBuilder::new()
            .connect(&config.rpc_url)
            .await
            .map_err(|e| connection_error(e.to_string()))?
            .erased();

        let head = provider
            .get_block_number()
            .await
            .map_err(|e| connection_error(e.to_string()))?;

        match provider.get_chain_id().await {
            Ok(remote) if remote != config.chain_id => {
                tracing::warn!(
                    chain = %config.name,
                    configured = config.chain_id,
                    remote,
                    "rpc endpoint reports a different chain id"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(chain = %config.name, error = %e, "chain id query failed");
            }
        }

        tracing::info!(
            chain = %config.name,
            contract = %format_address(&contract_address),
            head,
            "connected to rpc"
        );

        let contract = IStakeFlowStaking::new(contract_address, provider.clone());
        Ok(Self {
            chain: config.name.clone(),
            contract_address,
            provider,
            contract,
        })
    }

    fn log_filter(&self, kind: EventKind, range: BlockRange) -> Filter {
        Filter::new()
            .address(self.contract_address)
            .event_signature(signature_hash(kind))
            .from_block(range.from)
            .to_block(range.to)
    }
}

#[async_trait]
impl ChainClient for EvmChainClient {
    fn chain(&self) -> &ChainId {
        &self.chain
    }

    async fn get_block_number(&self) -> Result<u64, IndexerError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| IndexerError::Rpc(format!("{}: {e}", self.chain)))
    }

    async fn get_block(&self, number: u64) -> Option<BlockInfo> {
        match self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await
        {
            Ok(Some(block)) => {
                let timestamp = i64::try_from(block.header.timestamp)
                    .ok()
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))?;
                Some(BlockInfo {
                    number: block.header.number,
                    hash: format_hash(&block.header.hash),
                    timestamp,
                })
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(chain = %self.chain, block = number, error = %e, "block fetch failed");
                None
            }
        }
    }

    async fn get_pool_count(&self) -> u64 {
        match self.contract.poolCount().call().await {
            Ok(count) => u64::try_from(count).unwrap_or_else(|_| {
                tracing::warn!(chain = %self.chain, %count, "pool count out of range");
                0
            }),
            Err(e) => {
                tracing::warn!(chain = %self.chain, error = %e, "poolCount call failed");
                0
            }
        }
    }

    async fn get_pool_info(&self, pool_id: u64) -> Option<PoolSnapshot> {
        let id = U256::from(pool_id);
        let pool = match self.contract.getPool(id).call().await {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!(chain = %self.chain, pool_id, error = %e, "getPool call failed");
                return None;
            }
        };
        let apy = match self.contract.getPoolAPY(id).call().await {
            Ok(apy) => apy,
            Err(e) => {
                tracing::warn!(chain = %self.chain, pool_id, error = %e, "getPoolAPY call failed");
                return None;
            }
        };

        let snapshot = pool_snapshot(pool_id, &pool, apy);
        if snapshot.is_none() {
            tracing::warn!(chain = %self.chain, pool_id, "pool fields out of range");
        }
        snapshot
    }

    async fn get_user_info(&self, pool_id: u64, user: Address) -> Option<UserSnapshot> {
        let id = U256::from(pool_id);
        let info = match self.contract.getUserInfo(id, user).call().await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(chain = %self.chain, pool_id, error = %e, "getUserInfo call failed");
                return None;
            }
        };
        let pending_rewards = match self.contract.pendingRewards(id, user).call().await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(chain = %self.chain, pool_id, error = %e, "pendingRewards call failed");
                return None;
            }
        };

        Some(UserSnapshot {
            staked_amount: info.stakedAmount,
            reward_debt: info.rewardDebt,
            pending_rewards,
            last_stake_time: u64::try_from(info.lastStakeTime).unwrap_or(u64::MAX),
            unlock_time: u64::try_from(info.unlockTime).unwrap_or(u64::MAX),
        })
    }

    async fn get_events(&self, kind: EventKind, range: BlockRange) -> Vec<RawEvent> {
        let logs = match self.provider.get_logs(&self.log_filter(kind, range)).await {
            Ok(logs) => logs,
            Err(e) => {
                tracing::warn!(chain = %self.chain, %kind, %range, error = %e, "log query failed");
                return Vec::new();
            }
        };

        match decode_logs(kind, &logs) {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(chain = %self.chain, %kind, %range, error = %e, "log decode failed");
                Vec::new()
            }
        }
    }

    async fn get_transaction_receipt(&self, tx_hash: B256) -> Option<ReceiptSummary> {
        match self.provider.get_transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) => Some(ReceiptSummary {
                tx_hash: format_hash(&receipt.transaction_hash),
                block_number: receipt.block_number,
                success: receipt.status(),
                gas_used: receipt.gas_used,
                effective_gas_price: receipt.effective_gas_price,
            }),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(chain = %self.chain, error = %e, "receipt fetch failed");
                None
            }
        }
    }

    async fn gas_price(&self) -> u128 {
        self.provider.get_gas_price().await.unwrap_or_else(|e| {
            tracing::warn!(chain = %self.chain, error = %e, "gas price query failed");
            0
        })
    }
}

const fn signature_hash(kind: EventKind) -> B256 {
    match kind {
        EventKind::Staked => Staked::SIGNATURE_HASH,
        EventKind::Withdrawn => Withdrawn::SIGNATURE_HASH,
        EventKind::RewardClaimed => RewardClaimed::SIGNATURE_HASH,
        EventKind::EmergencyWithdrawn => EmergencyWithdrawn::SIGNATURE_HASH,
    }
}

fn pool_snapshot(pool_id: u64, pool: &IStakeFlowStaking::Pool, apy: U256) -> Option<PoolSnapshot> {
    Some(PoolSnapshot {
        pool_id,
        staking_token: format_address(&pool.stakingToken),
        reward_token: format_address(&pool.rewardToken),
        total_staked: pool.totalStaked,
        reward_rate: pool.rewardRate,
        lock_duration_secs: u64::try_from(pool.lockDuration).ok()?,
        is_active: pool.isActive,
        deposit_fee_bps: u32::try_from(pool.depositFee).ok()?,
        withdraw_fee_bps: u32::try_from(pool.withdrawFee).ok()?,
        apy,
    })
}

/// Decodes logs of one kind. Any failing log fails the whole set.
///
/// # Errors
///
/// Returns [`IndexerError::Decode`] if a log does not match the event
/// signature, lacks block/transaction metadata (pending logs), or carries
/// a pool id beyond `u64`.
pub fn decode_logs(kind: EventKind, logs: &[Log]) -> Result<Vec<RawEvent>, IndexerError> {
    logs.iter().map(|log| decode_log(kind, log)).collect()
}

fn decode_log(kind: EventKind, log: &Log) -> Result<RawEvent, IndexerError> {
    let tx_hash = log
        .transaction_hash
        .ok_or_else(|| IndexerError::Decode(format!("{kind} log without transaction hash")))?;
    let block_number = log
        .block_number
        .ok_or_else(|| IndexerError::Decode(format!("{kind} log without block number")))?;
    let log_index = log
        .log_index
        .ok_or_else(|| IndexerError::Decode(format!("{kind} log without log index")))?;

    let mut event = match kind {
        EventKind::Staked => {
            let e = decode::<Staked>(log)?;
            partial(kind, &e.user, e.poolId)?.with(Some(e.amount), None, None, Some(e.timestamp))
        }
        EventKind::Withdrawn => {
            let e = decode::<Withdrawn>(log)?;
            partial(kind, &e.user, e.poolId)?.with(
                Some(e.amount),
                Some(e.rewardAmount),
                None,
                Some(e.timestamp),
            )
        }
        EventKind::RewardClaimed => {
            let e = decode::<RewardClaimed>(log)?;
            partial(kind, &e.user, e.poolId)?.with(
                None,
                Some(e.rewardAmount),
                None,
                Some(e.timestamp),
            )
        }
        EventKind::EmergencyWithdrawn => {
            let e = decode::<EmergencyWithdrawn>(log)?;
            partial(kind, &e.user, e.poolId)?.with(Some(e.amount), None, Some(e.penalty), None)
        }
    };

    event.tx_hash = format_hash(&tx_hash);
    event.block_number = block_number;
    event.log_index = log_index;
    Ok(event)
}

fn decode<E: SolEvent>(log: &Log) -> Result<E, IndexerError> {
    log.log_decode::<E>()
        .map(|decoded| decoded.inner.data)
        .map_err(|e| IndexerError::Decode(format!("{}: {e}", E::SIGNATURE)))
}

fn partial(kind: EventKind, user: &Address, pool_id: U256) -> Result<RawEvent, IndexerError> {
    let pool_id = u64::try_from(pool_id)
        .map_err(|_| IndexerError::Decode(format!("{kind} pool id {pool_id} exceeds u64")))?;
    Ok(RawEvent {
        kind,
        tx_hash: String::new(),
        block_number: 0,
        log_index: 0,
        pool_id,
        user_address: format_address(user),
        amount: None,
        reward_amount: None,
        penalty: None,
        emitted_at: None,
    })
}

impl RawEvent {
    fn with(
        mut self,
        amount: Option<U256>,
        reward_amount: Option<U256>,
        penalty: Option<U256>,
        emitted_at: Option<U256>,
    ) -> Self {
        self.amount = amount;
        self.reward_amount = reward_amount;
        self.penalty = penalty;
        self.emitted_at = emitted_at.and_then(|t| u64::try_from(t).ok());
        self
    }
}
