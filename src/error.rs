//! Indexer error types with HTTP status code mapping.
//!
//! [`IndexerError`] is the central error type for both the ingestion
//! pipeline and the read API. Each variant maps to a numeric code and an
//! HTTP status so API handlers can return it directly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2002,
///     "message": "pool 7 not found on sepolia",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see the ranges on [`IndexerError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Error enum shared by the chain client, engine, store and API.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                  |
/// |-----------|-----------------|------------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request              |
/// | 2000–2999 | Not Found       | 404 Not Found                |
/// | 3000–3999 | Server          | 500 Internal Server Error    |
/// | 5000–5999 | Chain           | 502 / 503                    |
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    /// RPC endpoint unreachable while building a chain client.
    #[error("cannot connect to {chain} rpc: {reason}")]
    Connection {
        /// Chain being connected.
        chain: String,
        /// Underlying transport failure.
        reason: String,
    },

    /// A chain read failed in a context where it cannot degrade to "no data".
    #[error("rpc error: {0}")]
    Rpc(String),

    /// A log, stored value or contract return could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Storage failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The stored cursor does not match the range being committed.
    #[error("cursor conflict on {chain}: expected block {expected}, found {found}")]
    CursorConflict {
        /// Chain whose cursor moved.
        chain: String,
        /// Cursor value the batch was computed from.
        expected: u64,
        /// Cursor value found in storage.
        found: u64,
    },

    /// Chain is not configured on this deployment.
    #[error("chain not configured: {0}")]
    ChainNotConfigured(String),

    /// Pool not mirrored for the given chain.
    #[error("pool {pool_id} not found on {chain}")]
    PoolNotFound {
        /// Chain partition.
        chain: String,
        /// On-chain pool id.
        pool_id: u64,
    },

    /// No receipt for the transaction hash.
    #[error("transaction {0} not found")]
    TransactionNotFound(String),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The engine was asked to stop while waiting.
    #[error("indexer shutting down")]
    Shutdown,
}

impl IndexerError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::ChainNotConfigured(_) => 2001,
            Self::PoolNotFound { .. } => 2002,
            Self::TransactionNotFound(_) => 2003,
            Self::Persistence(_) => 3001,
            Self::Decode(_) => 3002,
            Self::Config(_) => 3003,
            Self::CursorConflict { .. } => 3004,
            Self::Shutdown => 3005,
            Self::Connection { .. } => 5001,
            Self::Rpc(_) => 5002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::ChainNotConfigured(_)
            | Self::PoolNotFound { .. }
            | Self::TransactionNotFound(_) => StatusCode::NOT_FOUND,
            Self::Connection { .. } | Self::Rpc(_) => StatusCode::BAD_GATEWAY,
            Self::Shutdown => StatusCode::SERVICE_UNAVAILABLE,
            Self::Persistence(_)
            | Self::Decode(_)
            | Self::Config(_)
            | Self::CursorConflict { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for IndexerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_variants_map_to_404() {
        let err = IndexerError::PoolNotFound {
            chain: "sepolia".to_string(),
            pool_id: 3,
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), 2002);
        assert_eq!(err.to_string(), "pool 3 not found on sepolia");
    }

    #[test]
    fn into_response_carries_status() {
        let response = IndexerError::InvalidRequest("bad limit".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn shutdown_is_unavailable() {
        assert_eq!(
            IndexerError::Shutdown.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
