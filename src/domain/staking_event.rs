//! Staking contract events and their persisted audit records.
//!
//! Every decoded on-chain log becomes exactly one [`StakingEvent`] row.
//! Rows are append-only: the indexer inserts them inside the batch
//! transaction and never updates them afterwards.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChainId, U256};
use crate::error::IndexerError;

/// The four event kinds emitted by the staking contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    /// `Staked(user, poolId, amount, timestamp)`.
    Staked,
    /// `Withdrawn(user, poolId, amount, rewardAmount, timestamp)`.
    Withdrawn,
    /// `RewardClaimed(user, poolId, rewardAmount, timestamp)`.
    RewardClaimed,
    /// `EmergencyWithdrawn(user, poolId, amount, penalty)`.
    EmergencyWithdrawn,
}

impl EventKind {
    /// All kinds, in the order they are fetched from the chain.
    pub const ALL: [Self; 4] = [
        Self::Staked,
        Self::Withdrawn,
        Self::RewardClaimed,
        Self::EmergencyWithdrawn,
    ];

    /// Returns the contract-level event name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Staked => "Staked",
            Self::Withdrawn => "Withdrawn",
            Self::RewardClaimed => "RewardClaimed",
            Self::EmergencyWithdrawn => "EmergencyWithdrawn",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| IndexerError::InvalidRequest(format!("unknown event type: {s}")))
    }
}

/// Immutable record of one staking contract log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakingEvent {
    /// Chain partition.
    pub chain: ChainId,
    /// Event kind.
    pub kind: EventKind,
    /// Transaction hash (`0x`-prefixed lowercase hex).
    pub tx_hash: String,
    /// Block that contains the log.
    pub block_number: u64,
    /// Position of the log within its block.
    pub log_index: u64,
    /// On-chain pool id.
    pub pool_id: u64,
    /// Staker address (`0x`-prefixed lowercase hex).
    pub user_address: String,
    /// Staked or withdrawn principal, when the event carries one.
    pub amount: Option<U256>,
    /// Reward paid out, when the event carries one.
    pub reward_amount: Option<U256>,
    /// Early-exit penalty of an emergency withdrawal. Recorded here only;
    /// it never reaches the stake ledger.
    pub penalty: Option<U256>,
    /// Block timestamp of the log.
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_case_insensitively() {
        assert!(matches!("staked".parse::<EventKind>(), Ok(EventKind::Staked)));
        assert!(matches!(
            "EMERGENCYWITHDRAWN".parse::<EventKind>(),
            Ok(EventKind::EmergencyWithdrawn)
        ));
        assert!("Deposited".parse::<EventKind>().is_err());
    }

    #[test]
    fn display_matches_contract_names() {
        let names: Vec<String> = EventKind::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            ["Staked", "Withdrawn", "RewardClaimed", "EmergencyWithdrawn"]
        );
    }
}
