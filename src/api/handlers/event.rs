//! Event search handler.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use super::parse_address;
use crate::api::dto::{
    ChainQuery, EventDto, EventListResponse, EventQuery, PaginationMeta, PaginationParams,
};
use crate::app_state::AppState;
use crate::chain::format_address;
use crate::domain::EventKind;
use crate::error::{ErrorResponse, IndexerError};
use crate::persistence::EventFilter;

/// `GET /events` — Filtered event search, newest first.
///
/// # Errors
///
/// Returns [`IndexerError::InvalidRequest`] for a malformed filter.
#[utoipa::path(
    get,
    path = "/api/v1/events",
    tag = "Events",
    summary = "Search events",
    description = "Returns a page of indexed staking events matching every supplied filter, newest first.",
    params(ChainQuery, EventQuery, PaginationParams),
    responses(
        (status = 200, description = "Event page", body = EventListResponse),
        (status = 400, description = "Malformed filter", body = ErrorResponse),
        (status = 404, description = "Chain not configured", body = ErrorResponse),
    )
)]
pub async fn list_events(
    State(state): State<AppState>,
    Query(chain): Query<ChainQuery>,
    Query(query): Query<EventQuery>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, IndexerError> {
    let chain = state.resolve_chain(chain.chain.as_ref())?;
    let filter = EventFilter {
        kind: query
            .event_type
            .as_deref()
            .map(str::parse::<EventKind>)
            .transpose()?,
        pool_id: query.pool_id,
        user_address: query
            .user_address
            .as_deref()
            .map(|raw| parse_address(raw).map(|a| format_address(&a)))
            .transpose()?,
        from_block: query.from_block,
        to_block: query.to_block,
        from_time: query.from_time,
        to_time: query.to_time,
        ..EventFilter::new(chain)
    };

    let page = params.page();
    let events = state.ledger.list_events(&filter, page).await?;
    Ok(Json(EventListResponse {
        data: events.items.iter().map(EventDto::from).collect(),
        pagination: PaginationMeta::new(page, events.total),
    }))
}

/// Event routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/events", get(list_events))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::http::StatusCode;

    use crate::api::handlers::test_support::{Fixture, get_json};
    use crate::chain::mock::{pool_snapshot, raw_event};
    use crate::domain::EventKind;

    async fn seeded() -> Fixture {
        let fixture = Fixture::new();
        fixture
            .seed_pools(vec![pool_snapshot(0, 60), pool_snapshot(1, 60)])
            .await;
        let mut other_pool = raw_event(EventKind::Staked, 12, 0);
        other_pool.pool_id = 1;
        fixture
            .index(vec![
                raw_event(EventKind::Staked, 10, 0),
                raw_event(EventKind::Staked, 11, 0),
                other_pool,
                raw_event(EventKind::Withdrawn, 13, 0),
            ])
            .await;
        fixture
    }

    #[tokio::test]
    async fn newest_first_with_pagination() {
        let fixture = seeded().await;
        let (status, body) = get_json(fixture.router(), "/api/v1/events?limit=2&offset=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["total"], 4);
        assert_eq!(body["data"][0]["block_number"], 12);
        assert_eq!(body["data"][1]["block_number"], 11);
    }

    #[tokio::test]
    async fn filters_combine() {
        let fixture = seeded().await;
        let (_, body) = get_json(
            fixture.router(),
            "/api/v1/events?event_type=Staked&pool_id=0&from_block=11",
        )
        .await;
        assert_eq!(body["pagination"]["total"], 1);
        assert_eq!(body["data"][0]["block_number"], 11);
        assert_eq!(body["data"][0]["amount"], "100");
    }

    #[tokio::test]
    async fn unknown_chain_is_404() {
        let fixture = seeded().await;
        let (status, _) = get_json(fixture.router(), "/api/v1/events?chain=base").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
