use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use crate::models::owner::Owner;

/// Why the durable store could not complete an operation
#[derive(Debug, thiserror::Error)]
pub enum StorageFailure {
    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Typed failures returned by the ledger services.
///
/// None of these are retried inside the ledger; the caller decides.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid amount: {0} (must be a positive number of credits)")]
    InvalidAmount(i64),

    #[error("Insufficient credits for {owner}: requested {requested}, available {available}")]
    InsufficientCredits {
        owner: Owner,
        requested: i64,
        available: i64,
    },

    #[error("User {0} does not belong to an organization")]
    NoOrganization(Uuid),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageFailure),
}

impl From<sea_orm::DbErr> for LedgerError {
    fn from(err: sea_orm::DbErr) -> Self {
        LedgerError::StorageUnavailable(StorageFailure::Database(err))
    }
}

impl LedgerError {
    /// Only storage failures may be transient
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::StorageUnavailable(_))
    }
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Errors surfaced by the admin HTTP layer
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(err: sea_orm::DbErr) -> Self {
        ApiError::Ledger(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Ledger(ref err) => match err {
                LedgerError::InvalidAmount(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_AMOUNT", err.to_string())
                }
                LedgerError::InsufficientCredits { .. } => {
                    (StatusCode::CONFLICT, "INSUFFICIENT_CREDITS", err.to_string())
                }
                LedgerError::NoOrganization(_) => {
                    (StatusCode::NOT_FOUND, "NO_ORGANIZATION", err.to_string())
                }
                LedgerError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                LedgerError::StorageUnavailable(failure) => {
                    tracing::error!("Storage unavailable: {:?}", failure);
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "STORAGE_UNAVAILABLE",
                        "Credit storage is temporarily unavailable".to_string(),
                    )
                }
            },
            ApiError::BadRequest(ref msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::NotFound(ref msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::Internal(ref e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, Json(body)).into_response()
    }
}

// Helper type for results
pub type Result<T> = std::result::Result<T, ApiError>;
