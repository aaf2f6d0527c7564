//! Pool handlers: list, detail, stats.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{
    ChainQuery, PaginationMeta, PaginationParams, PoolDto, PoolListQuery, PoolListResponse,
    PoolStatsResponse,
};
use crate::app_state::AppState;
use crate::domain::format_amount;
use crate::error::{ErrorResponse, IndexerError};

/// `GET /pools` — List mirrored pools with pagination.
///
/// # Errors
///
/// Returns [`IndexerError`] on unknown chains or store failures.
#[utoipa::path(
    get,
    path = "/api/v1/pools",
    tag = "Pools",
    summary = "List pools",
    description = "Returns a paginated list of mirrored pools ordered by id, optionally only the active ones.",
    params(ChainQuery, PoolListQuery, PaginationParams),
    responses(
        (status = 200, description = "Paginated pool list", body = PoolListResponse),
        (status = 404, description = "Chain not configured", body = ErrorResponse),
    )
)]
pub async fn list_pools(
    State(state): State<AppState>,
    Query(chain): Query<ChainQuery>,
    Query(filter): Query<PoolListQuery>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, IndexerError> {
    let chain = state.resolve_chain(chain.chain.as_ref())?;
    let page = params.page();
    let pools = state
        .ledger
        .list_pools(&chain, filter.active_only, page)
        .await?;

    Ok(Json(PoolListResponse {
        data: pools.items.iter().map(PoolDto::from).collect(),
        pagination: PaginationMeta::new(page, pools.total),
    }))
}

/// `GET /pools/{pool_id}` — Pool details with live totals.
///
/// `total_staked` and `apy` are read from the contract when it answers,
/// otherwise the mirrored values are returned.
///
/// # Errors
///
/// Returns [`IndexerError::PoolNotFound`] if the pool was never mirrored.
#[utoipa::path(
    get,
    path = "/api/v1/pools/{pool_id}",
    tag = "Pools",
    summary = "Get pool details",
    description = "Returns one mirrored pool, refreshing total staked and APY from the contract.",
    params(
        ("pool_id" = u64, Path, description = "Pool index"),
        ChainQuery,
    ),
    responses(
        (status = 200, description = "Pool details", body = PoolDto),
        (status = 404, description = "Pool or chain not found", body = ErrorResponse),
    )
)]
pub async fn get_pool(
    State(state): State<AppState>,
    Path(pool_id): Path<u64>,
    Query(query): Query<ChainQuery>,
) -> Result<impl IntoResponse, IndexerError> {
    let chain = state.resolve_chain(query.chain.as_ref())?;
    let pool = state
        .ledger
        .get_pool(&chain, pool_id)
        .await?
        .ok_or_else(|| IndexerError::PoolNotFound {
            chain: chain.to_string(),
            pool_id,
        })?;

    let mut dto = PoolDto::from(&pool);
    if let Some(live) = state.chains.get(&chain)?.client.get_pool_info(pool_id).await {
        dto.total_staked = format_amount(live.total_staked);
        dto.apy = format_amount(live.apy);
    }
    Ok(Json(dto))
}

/// `GET /pools/{pool_id}/stats` — Stakers, total staked, recent events.
///
/// # Errors
///
/// Returns [`IndexerError::PoolNotFound`] if the pool was never mirrored.
#[utoipa::path(
    get,
    path = "/api/v1/pools/{pool_id}/stats",
    tag = "Pools",
    summary = "Pool statistics",
    description = "Returns unique active stakers, total active stake and the ten most recent events of a pool.",
    params(
        ("pool_id" = u64, Path, description = "Pool index"),
        ChainQuery,
    ),
    responses(
        (status = 200, description = "Pool statistics", body = PoolStatsResponse),
        (status = 404, description = "Pool or chain not found", body = ErrorResponse),
    )
)]
pub async fn pool_stats(
    State(state): State<AppState>,
    Path(pool_id): Path<u64>,
    Query(query): Query<ChainQuery>,
) -> Result<impl IntoResponse, IndexerError> {
    let chain = state.resolve_chain(query.chain.as_ref())?;
    let stats = state
        .ledger
        .pool_stats(&chain, pool_id)
        .await?
        .ok_or_else(|| IndexerError::PoolNotFound {
            chain: chain.to_string(),
            pool_id,
        })?;
    Ok(Json(PoolStatsResponse::new(chain.to_string(), &stats)))
}

/// Pool routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/pools", get(list_pools))
        .route("/pools/{pool_id}", get(get_pool))
        .route("/pools/{pool_id}/stats", get(pool_stats))
}
