//! Error handling for the stock ledger service
//!
//! Core inventory errors keep their structured payload (cells, requested and
//! available quantities, violated fields) in the response `details`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::InventoryError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Inventory core errors
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Whether repeating the same request may succeed
    pub retryable: bool,
}

impl AppError {
    /// SQLSTATE codes raised when a movement loses a race for its rows
    const CONTENTION_CODES: [&'static str; 4] = ["55P03", "40001", "40P01", "57014"];

    /// Two conversions opening the same batch at once
    const OPEN_BATCH_INDEX: &'static str = "idx_conversion_batches_open";

    /// Whether the error is lock or serialization contention
    pub fn is_contention(&self) -> bool {
        match self {
            AppError::Inventory(err) => err.is_retryable(),
            AppError::DatabaseError(sqlx::Error::Database(db_err)) => {
                match db_err.code().as_deref() {
                    Some("23505") => db_err.constraint() == Some(Self::OPEN_BATCH_INDEX),
                    Some(code) => Self::CONTENTION_CODES.contains(&code),
                    None => false,
                }
            }
            AppError::DatabaseError(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }

    /// Collapse contention into the core's retryable conflict error
    pub fn into_conflict(self) -> AppError {
        if self.is_contention() && !matches!(self, AppError::Inventory(_)) {
            return AppError::Inventory(InventoryError::ConcurrencyConflict {
                message: self.to_string(),
            });
        }
        self
    }

    fn status_and_detail(&self) -> (StatusCode, ErrorDetail) {
        match self {
            AppError::Inventory(err) => {
                let status = match err {
                    InventoryError::InsufficientStock { .. } => StatusCode::CONFLICT,
                    InventoryError::InvalidMovement { .. } => StatusCode::BAD_REQUEST,
                    InventoryError::NoBoxesRemaining { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    InventoryError::ConcurrencyConflict { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    InventoryError::ConsistencyViolation { .. } => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                    InventoryError::NotFound { .. } => StatusCode::NOT_FOUND,
                    InventoryError::ConversionInFlight { .. } => StatusCode::CONFLICT,
                    InventoryError::InvalidTransition { .. } => StatusCode::CONFLICT,
                };
                let mut details = serde_json::to_value(err).ok();
                let code = details
                    .as_mut()
                    .and_then(|value| value.as_object_mut())
                    .and_then(|object| object.remove("code"))
                    .and_then(|code| code.as_str().map(str::to_owned))
                    .unwrap_or_else(|| "INVENTORY_ERROR".to_string());
                (
                    status,
                    ErrorDetail {
                        code,
                        message: err.to_string(),
                        details,
                        retryable: err.is_retryable(),
                    },
                )
            }
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "DATABASE_ERROR".to_string(),
                    message: "A database error occurred".to_string(),
                    details: None,
                    retryable: false,
                },
            ),
            AppError::Migration(_) | AppError::Configuration(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "CONFIGURATION_ERROR".to_string(),
                    message: "The service is misconfigured".to_string(),
                    details: None,
                    retryable: false,
                },
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message: msg.clone(),
                    details: None,
                    retryable: false,
                },
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred".to_string(),
                    details: None,
                    retryable: false,
                },
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = self.status_and_detail();

        match &self {
            AppError::Inventory(err) if err.is_fatal() => {
                tracing::error!(error = %err, "Ledger consistency violation");
            }
            _ if status.is_server_error() => tracing::error!("Error: {:?}", self),
            _ => tracing::warn!(code = %error_detail.code, "Request rejected: {}", self),
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
