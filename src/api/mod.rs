//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` and the
//! OpenAPI document live at the root.

pub mod dto;
pub mod handlers;

use axum::Router;
#[cfg(not(feature = "swagger-ui"))]
use axum::{Json, routing::get};
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI description of every read endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "StakeFlow Indexer API", description = "Read-only view of indexed staking pools, stakes and events."),
    paths(
        handlers::system::health_handler,
        handlers::chain::list_chains,
        handlers::chain::chain_status,
        handlers::chain::get_transaction,
        handlers::pool::list_pools,
        handlers::pool::get_pool,
        handlers::pool::pool_stats,
        handlers::user::user_stakes,
        handlers::user::user_positions,
        handlers::user::user_history,
        handlers::event::list_events,
        handlers::stats::protocol_stats,
    ),
    components(schemas(
        handlers::system::HealthResponse,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
        dto::PaginationMeta,
        dto::IndexerStatusDto,
        dto::ChainDto,
        dto::ChainListResponse,
        dto::ChainStatusResponse,
        dto::TransactionResponse,
        dto::PoolDto,
        dto::PoolListResponse,
        dto::PoolStatsResponse,
        dto::StakeDto,
        dto::UserStakesResponse,
        dto::PositionDto,
        dto::PositionsResponse,
        dto::EventDto,
        dto::EventListResponse,
        dto::ProtocolStatsResponse,
    )),
    tags(
        (name = "System", description = "Service health"),
        (name = "Chains", description = "Configured networks and indexer progress"),
        (name = "Pools", description = "Mirrored staking pools"),
        (name = "Users", description = "Per-user stakes, positions and history"),
        (name = "Events", description = "Indexed contract events"),
        (name = "Stats", description = "Protocol totals"),
    )
)]
pub struct ApiDoc;

/// Path of the generated OpenAPI document.
pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
        .merge(docs_routes())
}

#[cfg(feature = "swagger-ui")]
fn docs_routes() -> Router<AppState> {
    Router::new()
        .merge(utoipa_swagger_ui::SwaggerUi::new("/swagger-ui").url(OPENAPI_PATH, ApiDoc::openapi()))
}

#[cfg(not(feature = "swagger-ui"))]
fn docs_routes() -> Router<AppState> {
    Router::new().route(OPENAPI_PATH, get(|| async { Json(ApiDoc::openapi()) }))
}
