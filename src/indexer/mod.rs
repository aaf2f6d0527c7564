//! Indexing engine: turns chain logs into ledger rows, one batch at a time.

pub mod engine;
pub mod pool_sync;
pub mod retry;

pub use engine::{
    EngineSettings, EngineState, IndexerEngine, IndexerStatus, PollOutcome, next_range,
};
pub use pool_sync::sync_pools;
pub use retry::RetryPolicy;
