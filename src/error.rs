use std::time::Duration;

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::dao::storage::StorageError;

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Connection acting for a player it is not bound to.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Operation requires a completed join handshake.
    #[error("not authenticated: join first")]
    Unauthenticated,
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Duplicate unique field or a session that cannot accept the operation.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Too many score updates inside the rolling window.
    #[error("rate limit exceeded, retry in {}s", retry_after.as_secs())]
    RateLimited {
        /// Time until the window reopens.
        retry_after: Duration,
    },
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry in {}s", retry_after.as_secs())]
    RateLimited {
        /// Time until the window reopens.
        retry_after: Duration,
    },
    /// Internal server error. Store failures collapse here deliberately so no
    /// backend detail leaks to callers.
    #[error("internal error")]
    Internal,
}

impl AppError {
    /// Machine-readable error code carried in the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "VALIDATION_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::Internal => "INTERNAL_ERROR",
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(_) | ServiceError::Degraded => AppError::Internal,
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::Unauthenticated => AppError::Unauthorized("join first".into()),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Conflict(message) => AppError::Conflict(message),
            ServiceError::RateLimited { retry_after } => AppError::RateLimited { retry_after },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    error: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            success: false,
            message: self.to_string(),
            error: self.code(),
        });

        (status, payload).into_response()
    }
}
