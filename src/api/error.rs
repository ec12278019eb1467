use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ApiResponse;
use crate::services::AuthError;

#[derive(Debug)]
pub enum ApiError {
    ValidationError(String),

    Unauthorized(String),

    /// Signed token still verifies but the store-backed session is gone.
    SessionExpired,

    Forbidden(String),

    NotFound(String),

    /// Store unreachable at request time; surfaced without retry.
    ServiceUnavailable,

    DatabaseError(String),

    InternalError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::SessionExpired => write!(f, "Session expired"),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::ServiceUnavailable => write!(f, "Service unavailable"),
            ApiError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::SessionExpired => (
                StatusCode::UNAUTHORIZED,
                "Session expired. Please login again.".to_string(),
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Database connection failed".to_string(),
            ),
            ApiError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ApiResponse::<()>::error(error_message);
        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Validation(msg) => ApiError::ValidationError(msg),
            AuthError::DuplicateEmail
            | AuthError::InvalidOrExpiredCode
            | AuthError::NotFoundOrAlreadyVerified => ApiError::ValidationError(err.to_string()),
            AuthError::InvalidCredentials | AuthError::VerificationRequired => {
                ApiError::Unauthorized(err.to_string())
            }
            AuthError::Unauthorized => ApiError::Unauthorized("Invalid token".to_string()),
            AuthError::SessionExpired => ApiError::SessionExpired,
            AuthError::Unavailable => ApiError::ServiceUnavailable,
            AuthError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // Connection-level store failures surface as 503, like at boot.
        for cause in err.chain() {
            if let Some(db_err) = cause.downcast_ref::<sea_orm::DbErr>() {
                return match db_err {
                    sea_orm::DbErr::Conn(_) | sea_orm::DbErr::ConnectionAcquire(_) => {
                        ApiError::ServiceUnavailable
                    }
                    _ => ApiError::DatabaseError(err.to_string()),
                };
            }
        }
        ApiError::InternalError(err.to_string())
    }
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::ValidationError(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        ApiError::Unauthorized(msg.into())
    }

    pub fn not_found(resource: &str, id: impl fmt::Display) -> Self {
        ApiError::NotFound(format!("{} {} not found", resource, id))
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::InternalError(msg.into())
    }
}
