//! # API Error Type
//!
//! Converts layer errors into the uniform wire envelope.
//!
//! ## Envelope Contract
//! ```json
//! {"success": true, "...": "payload"}
//! {"success": false, "error": "Insufficient stock: Pale Fire (...)"}
//! ```
//!
//! Business-rule failures (validation, stock, state machine) return
//! HTTP 200 with `success: false`; only malformed requests and missing
//! or invalid sessions use non-200 statuses. Storage-level detail is
//! logged, never sent to the caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use bindery_core::CoreError;
use bindery_db::DbError;

/// API error carried through handlers and rendered as the failure
/// envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling.
    pub code: ErrorCode,

    /// Human-readable error message for display.
    pub message: String,
}

/// Error codes grouping the failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Resource absent or not owned by the caller.
    NotFound,

    /// Input validation failed.
    ValidationError,

    /// One or more titles short at reservation time.
    InsufficientStock,

    /// Idempotency-key replay raced a concurrent commit.
    DuplicateCheckout,

    /// Storage-level failure; retrying the request is safe.
    TransactionFailed,

    /// Business state machine refused the operation.
    BusinessLogic,

    /// Payment rule violation.
    PaymentError,

    /// Missing or invalid session identity.
    Unauthorized,

    /// Anything unexpected.
    Internal,
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{resource} not found: {id}"))
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    /// Creates an unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Unauthorized, message)
    }
}

/// Converts core business errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match &err {
            CoreError::BookNotFound(_) => ApiError::new(ErrorCode::NotFound, err.to_string()),
            CoreError::InsufficientStock { .. } => {
                // The message names every short title so the UI can
                // offer "reduce quantity or pre-order".
                ApiError::new(ErrorCode::InsufficientStock, err.to_string())
            }
            CoreError::EmptyCart => ApiError::new(ErrorCode::ValidationError, err.to_string()),
            CoreError::DuplicateCheckout => ApiError::new(
                ErrorCode::DuplicateCheckout,
                "A checkout with this idempotency key is already in progress; \
                 retry to receive the existing order",
            ),
            CoreError::InvalidTransition { .. } => {
                ApiError::new(ErrorCode::BusinessLogic, err.to_string())
            }
            CoreError::PaymentRejected { .. } => {
                ApiError::new(ErrorCode::PaymentError, err.to_string())
            }
            CoreError::Validation(e) => ApiError::validation(e.to_string()),
        }
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } => ApiError::new(
                ErrorCode::ValidationError,
                format!("{field} '{value}' already exists"),
            ),
            DbError::TransactionFailed(e) => {
                tracing::warn!("Transaction failed: {}", e);
                ApiError::new(
                    ErrorCode::TransactionFailed,
                    "The request could not be completed; nothing was changed and \
                     it is safe to retry",
                )
            }
            DbError::PoolExhausted => ApiError::new(
                ErrorCode::TransactionFailed,
                "The service is busy; it is safe to retry",
            ),
            DbError::Core(core) => ApiError::from(core),
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                ApiError::new(ErrorCode::ValidationError, "Invalid reference")
            }
            DbError::ConnectionFailed(e) | DbError::MigrationFailed(e) | DbError::QueryFailed(e) => {
                tracing::error!("Database failure: {}", e);
                ApiError::new(ErrorCode::Internal, "Database operation failed")
            }
            DbError::Internal(e) => {
                tracing::error!("Internal database error: {}", e);
                ApiError::new(ErrorCode::Internal, "Database operation failed")
            }
        }
    }
}

/// Renders the failure envelope.
///
/// Business failures are HTTP 200 with `success: false` per the wire
/// contract; auth failures are the exception and use 401.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.code {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::OK,
        };

        let body = Json(serde_json::json!({
            "success": false,
            "error": self.message,
        }));

        (status, body).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// =============================================================================
// Unit Tests
// =============================================================================
