//! # stakeflow-indexer
//!
//! Chain indexer and read API for the StakeFlow staking protocol.
//!
//! One indexing engine per configured EVM network pulls the staking
//! contract's logs in bounded block batches, replays them into pool, stake
//! and event rows, and advances a per-chain cursor in the same
//! transaction. An Axum API serves the mirrored state.
//!
//! ## Architecture
//!
//! ```text
//! JSON-RPC node (per chain)
//!     │
//!     ├── ChainClient (chain/)       alloy provider + contract bindings
//!     │
//!     ├── IndexerEngine (indexer/)   batches, retries, cursor
//!     ├── Stake rules (domain/)
//!     │
//!     ├── LedgerStore (persistence/) PostgreSQL or in-memory
//!     │
//!     └── REST Handlers (api/)       read-only queries
//! ```

pub mod api;
pub mod app_state;
pub mod chain;
pub mod config;
pub mod domain;
pub mod error;
pub mod indexer;
pub mod persistence;
