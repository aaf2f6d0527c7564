//! REST endpoint handlers organized by resource.

pub mod chain;
pub mod event;
pub mod pool;
pub mod stats;
pub mod system;
pub mod user;

use alloy::primitives::Address;
use axum::Router;

use crate::app_state::AppState;
use crate::error::IndexerError;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(chain::routes())
        .merge(pool::routes())
        .merge(user::routes())
        .merge(event::routes())
        .merge(stats::routes())
}

/// Parses a 0x-prefixed, 20-byte hex address. Checksum casing is not enforced.
fn parse_address(raw: &str) -> Result<Address, IndexerError> {
    raw.parse()
        .map_err(|_| IndexerError::InvalidRequest(format!("invalid address: {raw}")))
}
