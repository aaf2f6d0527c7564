//! Domain layer: the ledger entities and their mutation rules.
//!
//! Everything here is chain- and storage-agnostic: plain values, the
//! chain partition key, and the pure balance rules the indexing engine
//! replays events through.

pub mod amount;
pub mod chain_id;
pub mod indexer_state;
pub mod pool;
pub mod stake;
pub mod staking_event;

pub use amount::{U256, format_amount, parse_amount};
pub use chain_id::ChainId;
pub use indexer_state::IndexerState;
pub use pool::{DEFAULT_LOCK_DURATION_SECS, Pool};
pub use stake::{Stake, apply_event};
pub use staking_event::{EventKind, StakingEvent};
