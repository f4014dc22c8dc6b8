//! Error types for Athenaeum server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application error codes carried in every error response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Success = 0,
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NoSuchRecord = 4,
    BadValue = 5,
    Duplicate = 6,
    InsufficientInventory = 7,
    DuplicateActiveRequest = 8,
    InvalidState = 9,
    OutstandingFines = 10,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation attempted from a borrow status that does not permit it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Insufficient inventory: {0}")]
    InsufficientInventory(String),

    #[error("Duplicate active request: {0}")]
    DuplicateActiveRequest(String),

    /// Paid-fine mutation or extension with outstanding fines
    #[error("Financial conflict: {0}")]
    ConflictFinancial(String),

    /// Uniqueness violation on catalog data (ISBN, category name, shelf code)
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl AppError {
    /// The taxonomy kind, used by handlers and tests
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Authentication(_) | AppError::Forbidden(_) => ErrorCode::NotAuthorized,
            AppError::NotFound(_) => ErrorCode::NoSuchRecord,
            AppError::Validation(_) => ErrorCode::BadValue,
            AppError::InvalidState(_) => ErrorCode::InvalidState,
            AppError::InsufficientInventory(_) => ErrorCode::InsufficientInventory,
            AppError::DuplicateActiveRequest(_) => ErrorCode::DuplicateActiveRequest,
            AppError::ConflictFinancial(_) => ErrorCode::OutstandingFines,
            AppError::Conflict(_) => ErrorCode::Duplicate,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Internal(_) => ErrorCode::Failure,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message) = match &self {
            AppError::Authentication(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InvalidState(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::InsufficientInventory(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, msg.clone())
            }
            AppError::DuplicateActiveRequest(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::ConflictFinancial(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
