//! Protocol-wide statistics handler.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{ChainQuery, ProtocolStatsResponse};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, IndexerError};

/// `GET /stats` — Protocol totals for one chain.
///
/// # Errors
///
/// Returns [`IndexerError`] on unknown chains or store failures.
#[utoipa::path(
    get,
    path = "/api/v1/stats",
    tag = "Stats",
    summary = "Protocol statistics",
    description = "Returns pool and staker counts, total active stake and total rewards distributed by withdrawals and claims.",
    params(ChainQuery),
    responses(
        (status = 200, description = "Protocol statistics", body = ProtocolStatsResponse),
        (status = 404, description = "Chain not configured", body = ErrorResponse),
    )
)]
pub async fn protocol_stats(
    State(state): State<AppState>,
    Query(query): Query<ChainQuery>,
) -> Result<impl IntoResponse, IndexerError> {
    let chain = state.resolve_chain(query.chain.as_ref())?;
    let stats = state.ledger.protocol_stats(&chain).await?;
    Ok(Json(ProtocolStatsResponse::new(chain.to_string(), &stats)))
}

/// Stats routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/stats", get(protocol_stats))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::http::StatusCode;

    use crate::api::handlers::test_support::{Fixture, get_json};
    use crate::chain::mock::{pool_snapshot, raw_event};
    use crate::domain::{EventKind, U256};

    #[tokio::test]
    async fn rewards_come_from_withdrawals_and_claims() {
        let fixture = Fixture::new();
        fixture.seed_pools(vec![pool_snapshot(0, 60)]).await;
        let mut withdrawn = raw_event(EventKind::Withdrawn, 11, 0);
        withdrawn.amount = Some(U256::from(40));
        withdrawn.reward_amount = Some(U256::from(5));
        let mut claimed = raw_event(EventKind::RewardClaimed, 12, 0);
        claimed.amount = None;
        claimed.reward_amount = Some(U256::from(7));
        fixture
            .index(vec![raw_event(EventKind::Staked, 10, 0), withdrawn, claimed])
            .await;

        let (status, body) = get_json(fixture.router(), "/api/v1/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["chain"], "sepolia");
        assert_eq!(body["total_pools"], 1);
        assert_eq!(body["total_stakers"], 1);
        assert_eq!(body["total_staked"], "60");
        assert_eq!(body["total_rewards_distributed"], "12");
        assert_eq!(body["total_events"], 3);
    }
}
