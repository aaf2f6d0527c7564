//! User handlers: ledger stakes, live positions, event history.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use super::parse_address;
use crate::api::dto::{
    ChainQuery, EventDto, EventListResponse, HistoryQuery, PaginationMeta, PaginationParams,
    PositionDto, PositionsResponse, StakeDto, UserStakesResponse,
};
use crate::app_state::AppState;
use crate::chain::format_address;
use crate::domain::EventKind;
use crate::error::{ErrorResponse, IndexerError};
use crate::persistence::{EventFilter, Page, StakeFilter};

/// `GET /users/{address}/stakes` — Active ledger positions.
///
/// # Errors
///
/// Returns [`IndexerError::InvalidRequest`] for a malformed address.
#[utoipa::path(
    get,
    path = "/api/v1/users/{address}/stakes",
    tag = "Users",
    summary = "User stakes",
    description = "Returns the user's active positions as mirrored by the indexer, with their lock state.",
    params(
        ("address" = String, Path, description = "0x-prefixed user address"),
        ChainQuery,
    ),
    responses(
        (status = 200, description = "Active stakes", body = UserStakesResponse),
        (status = 400, description = "Malformed address", body = ErrorResponse),
        (status = 404, description = "Chain not configured", body = ErrorResponse),
    )
)]
pub async fn user_stakes(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<ChainQuery>,
) -> Result<impl IntoResponse, IndexerError> {
    let chain = state.resolve_chain(query.chain.as_ref())?;
    let user = format_address(&parse_address(&address)?);
    let filter = StakeFilter {
        chain: chain.clone(),
        user_address: Some(user.clone()),
        pool_id: None,
        active_only: true,
    };
    let stakes = state.ledger.list_stakes(&filter, Page::all()).await?;
    let now = Utc::now();

    Ok(Json(UserStakesResponse {
        chain: chain.to_string(),
        user_address: user,
        stakes: stakes.items.iter().map(|s| StakeDto::new(s, now)).collect(),
    }))
}

/// `GET /users/{address}/positions` — Live positions read from the contract.
///
/// # Errors
///
/// Returns [`IndexerError::InvalidRequest`] for a malformed address.
#[utoipa::path(
    get,
    path = "/api/v1/users/{address}/positions",
    tag = "Users",
    summary = "Live user positions",
    description = "Queries the staking contract for the user's balance and pending rewards in every pool, with the pool's APY.",
    params(
        ("address" = String, Path, description = "0x-prefixed user address"),
        ChainQuery,
    ),
    responses(
        (status = 200, description = "Live positions", body = PositionsResponse),
        (status = 400, description = "Malformed address", body = ErrorResponse),
        (status = 404, description = "Chain not configured", body = ErrorResponse),
    )
)]
pub async fn user_positions(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<ChainQuery>,
) -> Result<impl IntoResponse, IndexerError> {
    let chain = state.resolve_chain(query.chain.as_ref())?;
    let user = parse_address(&address)?;
    let client = &state.chains.get(&chain)?.client;
    let now_secs = u64::try_from(Utc::now().timestamp()).unwrap_or_default();

    let mut positions = Vec::new();
    for pool_id in 0..client.get_pool_count().await {
        let Some(info) = client.get_user_info(pool_id, user).await else {
            continue;
        };
        if info.staked_amount.is_zero() && info.pending_rewards.is_zero() {
            continue;
        }
        let apy = client.get_pool_info(pool_id).await.map(|pool| pool.apy);
        positions.push(PositionDto::new(pool_id, &info, apy, now_secs));
    }

    Ok(Json(PositionsResponse {
        chain: chain.to_string(),
        user_address: format_address(&user),
        positions,
    }))
}

/// `GET /users/{address}/history` — The user's events, newest first.
///
/// # Errors
///
/// Returns [`IndexerError::InvalidRequest`] for a malformed address or
/// event type.
#[utoipa::path(
    get,
    path = "/api/v1/users/{address}/history",
    tag = "Users",
    summary = "User event history",
    description = "Returns a page of the user's staking events, newest first, optionally of one kind.",
    params(
        ("address" = String, Path, description = "0x-prefixed user address"),
        ChainQuery,
        HistoryQuery,
        PaginationParams,
    ),
    responses(
        (status = 200, description = "Event page", body = EventListResponse),
        (status = 400, description = "Malformed address or event type", body = ErrorResponse),
        (status = 404, description = "Chain not configured", body = ErrorResponse),
    )
)]
pub async fn user_history(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<ChainQuery>,
    Query(history): Query<HistoryQuery>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, IndexerError> {
    let chain = state.resolve_chain(query.chain.as_ref())?;
    let mut filter = EventFilter::new(chain);
    filter.user_address = Some(format_address(&parse_address(&address)?));
    filter.kind = history
        .event_type
        .as_deref()
        .map(str::parse::<EventKind>)
        .transpose()?;

    let page = params.page();
    let events = state.ledger.list_events(&filter, page).await?;
    Ok(Json(EventListResponse {
        data: events.items.iter().map(EventDto::from).collect(),
        pagination: PaginationMeta::new(page, events.total),
    }))
}

/// User routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/{address}/stakes", get(user_stakes))
        .route("/users/{address}/positions", get(user_positions))
        .route("/users/{address}/history", get(user_history))
}
