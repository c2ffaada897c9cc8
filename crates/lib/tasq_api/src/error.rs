//! Application error types.

use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tasq_core::auth::AuthError;
use tasq_core::ledger::TaskError;
use tasq_core::store::StoreError;
use tasq_core::validation::ValidationErrors;
use thiserror::Error;
use tracing::{error, warn};

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(ValidationErrors),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already completed: {0}")]
    AlreadyCompleted(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    /// Wire name in the error body.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_failed",
            AppError::Unauthenticated(_) => "unauthenticated",
            AppError::NotFound(_) => "not_found",
            AppError::AlreadyCompleted(_) => "already_completed",
            AppError::Conflict(_) => "conflict",
            AppError::StoreUnavailable(_) => "store_unavailable",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyCompleted(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.kind().to_string();
        let (message, fields) = match self {
            AppError::Validation(errors) => {
                ("Validation failed".to_string(), Some(errors.fields().clone()))
            }
            AppError::Internal(detail) => {
                error!("internal error: {detail}");
                ("Internal server error".to_string(), None)
            }
            AppError::StoreUnavailable(detail) => {
                warn!("store unavailable: {detail}");
                ("Service temporarily unavailable".to_string(), None)
            }
            AppError::Unauthenticated(m)
            | AppError::NotFound(m)
            | AppError::AlreadyCompleted(m)
            | AppError::Conflict(m) => (m, None::<BTreeMap<String, String>>),
        };
        let body = Json(ErrorResponse {
            error,
            message,
            fields,
        });
        (status, body).into_response()
    }
}

impl From<ValidationErrors> for AppError {
    fn from(e: ValidationErrors) -> Self {
        AppError::Validation(e)
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::StoreUnavailable(e.to_string())
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Unauthenticated(msg) => AppError::Unauthenticated(msg),
            AuthError::CredentialError => AppError::Unauthenticated("Invalid credentials".into()),
            AuthError::UsernameTaken(name) => {
                AppError::Conflict(format!("Username '{name}' is already registered"))
            }
            AuthError::Validation(errors) => AppError::Validation(errors),
            AuthError::Store(e) => AppError::from(e),
            AuthError::TokenError(msg) | AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<TaskError> for AppError {
    fn from(e: TaskError) -> Self {
        match e {
            TaskError::NotFound => AppError::NotFound("Task not found".into()),
            TaskError::AlreadyCompleted => {
                AppError::AlreadyCompleted("Cannot update a completed task".into())
            }
            TaskError::StoreUnavailable(msg) => AppError::StoreUnavailable(msg),
        }
    }
}
