//! Data Transfer Objects for REST request/response serialization.
//!
//! All token amounts are serialized as decimal strings to prevent
//! precision loss on 256-bit values.

pub mod chain_dto;
pub mod common_dto;
pub mod event_dto;
pub mod pool_dto;
pub mod stake_dto;
pub mod stats_dto;

pub use chain_dto::*;
pub use common_dto::*;
pub use event_dto::*;
pub use pool_dto::*;
pub use stake_dto::*;
pub use stats_dto::*;
