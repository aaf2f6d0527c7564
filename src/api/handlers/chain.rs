//! Chain endpoints: configured networks, indexer status, receipts.

use alloy::primitives::B256;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{
    ChainDto, ChainListResponse, ChainQuery, ChainStatusResponse, IndexerStatusDto,
    TransactionResponse,
};
use crate::app_state::AppState;
use crate::domain::ChainId;
use crate::error::{ErrorResponse, IndexerError};

/// `GET /chains` — Configured networks with live engine status.
///
/// # Errors
///
/// Infallible today; kept fallible for handler uniformity.
#[utoipa::path(
    get,
    path = "/api/v1/chains",
    tag = "Chains",
    summary = "List configured chains",
    description = "Returns every network this deployment indexes together with the live status of its indexing engine.",
    responses(
        (status = 200, description = "Configured chains", body = ChainListResponse),
    )
)]
pub async fn list_chains(State(state): State<AppState>) -> Result<impl IntoResponse, IndexerError> {
    let chains = state
        .chains
        .iter()
        .map(|(name, handle)| ChainDto {
            chain: name.to_string(),
            chain_id: handle.chain_id,
            indexer: IndexerStatusDto::from(&*handle.status.borrow()),
        })
        .collect();
    Ok(Json(ChainListResponse { chains }))
}

/// `GET /chains/{chain}/status` — Cursor, engine status and gas price.
///
/// # Errors
///
/// Returns [`IndexerError::ChainNotConfigured`] for unknown networks.
#[utoipa::path(
    get,
    path = "/api/v1/chains/{chain}/status",
    tag = "Chains",
    summary = "Indexer status for one chain",
    description = "Returns the persisted cursor, the engine's live status and the current gas price.",
    params(
        ("chain" = String, Path, description = "Network name"),
    ),
    responses(
        (status = 200, description = "Chain status", body = ChainStatusResponse),
        (status = 404, description = "Chain not configured", body = ErrorResponse),
    )
)]
pub async fn chain_status(
    State(state): State<AppState>,
    Path(chain): Path<ChainId>,
) -> Result<impl IntoResponse, IndexerError> {
    let handle = state.chains.get(&chain)?;
    let cursor = state.ledger.indexer_state(&chain).await?;
    let indexer = IndexerStatusDto::from(&*handle.status.borrow());
    let gas_price = handle.client.gas_price().await;

    Ok(Json(ChainStatusResponse {
        chain: chain.to_string(),
        chain_id: handle.chain_id,
        last_indexed_block: cursor.as_ref().map(|c| c.last_block_number),
        cursor_updated_at: cursor.map(|c| c.updated_at),
        indexer,
        gas_price_wei: gas_price.to_string(),
    }))
}

/// `GET /transactions/{hash}` — Receipt summary for a transaction.
///
/// # Errors
///
/// Returns [`IndexerError::InvalidRequest`] for a malformed hash and
/// [`IndexerError::TransactionNotFound`] when the node has no receipt.
#[utoipa::path(
    get,
    path = "/api/v1/transactions/{hash}",
    tag = "Chains",
    summary = "Transaction receipt",
    description = "Looks up a transaction receipt on the selected chain.",
    params(
        ("hash" = String, Path, description = "0x-prefixed transaction hash"),
        ChainQuery,
    ),
    responses(
        (status = 200, description = "Receipt summary", body = TransactionResponse),
        (status = 400, description = "Malformed hash", body = ErrorResponse),
        (status = 404, description = "Unknown chain or transaction", body = ErrorResponse),
    )
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    Query(query): Query<ChainQuery>,
) -> Result<impl IntoResponse, IndexerError> {
    let chain = state.resolve_chain(query.chain.as_ref())?;
    let tx_hash: B256 = hash
        .parse()
        .map_err(|_| IndexerError::InvalidRequest(format!("invalid transaction hash: {hash}")))?;

    let receipt = state
        .chains
        .get(&chain)?
        .client
        .get_transaction_receipt(tx_hash)
        .await
        .ok_or(IndexerError::TransactionNotFound(hash))?;

    Ok(Json(TransactionResponse::new(chain.to_string(), receipt)))
}

/// Chain routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/chains", get(list_chains))
        .route("/chains/{chain}/status", get(chain_status))
        .route("/transactions/{hash}", get(get_transaction))
}
