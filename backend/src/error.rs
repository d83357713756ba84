//! Error handling for the Retail Suite back office
//!
//! Every failure is rendered as `{"error": {"code", "message", "field"?}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::DomainError;
use thiserror::Error;
use validator::ValidationErrors;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Permission denied: requires {0}")]
    Forbidden(&'static str),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business rule errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(resource: &str) -> Self {
        AppError::NotFound(resource.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let first = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, errs)| {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field));
                (field.to_string(), message)
            });

        match first {
            Some((field, message)) => AppError::Validation { field, message },
            None => AppError::ValidationError(errors.to_string()),
        }
    }
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
    pub field: Option<String>,
}

impl ErrorDetail {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
        }
    }

    fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

fn domain_error_detail(err: &DomainError) -> (StatusCode, ErrorDetail) {
    let message = err.to_string();
    match err {
        DomainError::InvalidTransition { .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorDetail::new("INVALID_STATE_TRANSITION", message),
        ),
        DomainError::Invalid { field, message } => (
            StatusCode::BAD_REQUEST,
            ErrorDetail::new("VALIDATION_ERROR", message.clone()).with_field(*field),
        ),
        DomainError::DuplicateProduct(_) => (
            StatusCode::BAD_REQUEST,
            ErrorDetail::new("DUPLICATE_PRODUCT", message).with_field("items"),
        ),
        DomainError::UnknownCaseLine(_) | DomainError::MissingTriageLine(_) => (
            StatusCode::BAD_REQUEST,
            ErrorDetail::new("VALIDATION_ERROR", message).with_field("items"),
        ),
        DomainError::NotADealer(_) => (
            StatusCode::BAD_REQUEST,
            ErrorDetail::new("INVALID_DEALER", message).with_field("dealer_id"),
        ),
        DomainError::RepairExceedsRepairable { .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorDetail::new("QUANTITY_EXCEEDS_BOUND", message),
        ),
        DomainError::StockUnderflow { .. } | DomainError::InsufficientStock { .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorDetail::new("INSUFFICIENT_STOCK", message),
        ),
        DomainError::LedgerAlreadyOpened => (
            StatusCode::CONFLICT,
            ErrorDetail::new("LEDGER_ALREADY_OPENED", message),
        ),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::InvalidToken(msg) => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("INVALID_TOKEN", msg.clone()),
            ),
            AppError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("UNAUTHORIZED", "Authentication required"),
            ),
            AppError::Forbidden(capability) => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new(
                    "FORBIDDEN",
                    format!("Permission denied: requires {}", capability),
                ),
            ),
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", message.clone()).with_field(field.clone()),
            ),
            AppError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", msg.clone()),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ErrorDetail::new("CONFLICT", msg.clone())),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("NOT_FOUND", format!("{} not found", resource)),
            ),
            AppError::Domain(err) => domain_error_detail(err),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("DATABASE_ERROR", "A database error occurred"),
            ),
            AppError::Internal(_) | AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", "An internal server error occurred"),
            ),
        };

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!(status = status.as_u16(), "Request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ReplacementStatus;

    #[test]
    fn domain_errors_map_to_client_statuses() {
        let wrong_state = AppError::from(DomainError::InvalidTransition {
            operation: "triage",
            status: ReplacementStatus::Checked,
        });
        assert_eq!(wrong_state.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);

        let not_dealer = AppError::from(DomainError::NotADealer(uuid::Uuid::new_v4()));
        assert_eq!(not_dealer.into_response().status(), StatusCode::BAD_REQUEST);

        let opened = AppError::from(DomainError::LedgerAlreadyOpened);
        assert_eq!(opened.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn duplicate_products_are_a_validation_failure() {
        let duplicate = AppError::from(DomainError::DuplicateProduct(uuid::Uuid::new_v4()));
        let (status, detail) = match &duplicate {
            AppError::Domain(err) => domain_error_detail(err),
            other => panic!("unexpected error: {:?}", other),
        };
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(detail.code, "DUPLICATE_PRODUCT");
        assert_eq!(detail.field.as_deref(), Some("items"));
        assert_eq!(duplicate.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn database_errors_are_elided() {
        let response = AppError::from(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
