//! Shared DTO types used across multiple endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::ChainId;
use crate::persistence::Page;

/// Default page size.
pub const DEFAULT_LIMIT: u64 = 20;

/// Largest page size a client may request.
pub const MAX_LIMIT: u64 = 100;

/// `?chain=` selector. Falls back to the deployment's default chain.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ChainQuery {
    /// Network name (`ethereum`, `arbitrum`, `base`, `sepolia`).
    #[param(value_type = Option<String>)]
    pub chain: Option<ChainId>,
}

/// Pagination query parameters for list endpoints.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    /// Rows to skip. Defaults to 0.
    #[serde(default)]
    pub offset: u64,
    /// Rows per page (1..=100). Defaults to 20.
    #[serde(default = "default_limit")]
    pub limit: u64,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

impl PaginationParams {
    /// Clamps `limit` to `1..=100` and `offset` to what a store can
    /// address, and converts to a store page.
    #[must_use]
    pub fn page(&self) -> Page {
        Page::new(
            self.offset.min(Page::all().limit),
            self.limit.clamp(1, MAX_LIMIT),
        )
    }
}

/// Pagination metadata included in list responses.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaginationMeta {
    /// Rows skipped.
    pub offset: u64,
    /// Effective page size.
    pub limit: u64,
    /// Total number of matching rows.
    pub total: u64,
}

impl PaginationMeta {
    /// Builds the metadata for `page` out of `total` rows.
    #[must_use]
    pub const fn new(page: Page, total: u64) -> Self {
        Self {
            offset: page.offset,
            limit: page.limit,
            total,
        }
    }
}
