//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use keyway_core::auth::AuthError;
use keyway_core::captcha::CaptchaError;
use keyway_core::users::validate::ValidationError;
use keyway_core::users::{ReconcileError, RepoError};
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    /// The one message every failed credential check produces.
    pub fn invalid_credentials() -> Self {
        AppError::Unauthorized("Invalid credentials".into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::Unavailable(m) => {
                error!(detail = %m, "dependency unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service_unavailable",
                    "Service temporarily unavailable",
                )
            }
            AppError::Internal(m) => {
                error!(detail = %m, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<RepoError> for AppError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Conflict(msg) => AppError::Conflict(msg),
            RepoError::Invalid(msg) => AppError::Validation(msg),
            RepoError::NotFound(id) => AppError::Internal(format!("user {id} vanished")),
            RepoError::Database(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::EmptyPassword => AppError::Validation(e.to_string()),
            AuthError::Hashing(msg) | AuthError::Signing(msg) => AppError::Internal(msg),
        }
    }
}

impl From<CaptchaError> for AppError {
    fn from(e: CaptchaError) -> Self {
        match e {
            CaptchaError::MissingToken | CaptchaError::VerificationFailed(_) => {
                AppError::Validation(e.to_string())
            }
            CaptchaError::Request(msg) => AppError::Unavailable(msg),
            CaptchaError::Misconfigured => AppError::Internal(e.to_string()),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::LinkedElsewhere { .. } => AppError::Conflict(e.to_string()),
            ReconcileError::Failed(_) => AppError::Internal(e.to_string()),
        }
    }
}
