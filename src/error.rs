use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

/// Errors that can occur in store and service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Caller lacks the role or ownership required for the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Request is missing required credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Operation cannot be performed in the current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Score write lost against a newer or duplicate revision.
    #[error("stale or duplicate score write")]
    StaleScore {
        /// Revision currently persisted for the hole, if any.
        current_revision: Option<i64>,
    },
    /// Payload exceeds the configured size limit.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    /// Caller exceeded a rate limit.
    #[error("{0}")]
    RateLimited(String),
    /// Blocked by the tournament-safety interlock.
    #[error("{0}")]
    SafetyBlocked(String),
    /// A required capability is not configured.
    #[error("{0}")]
    Disabled(String),
    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
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
    /// Role or ownership check failed.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Score write conflict carrying the persisted revision.
    #[error("stale or duplicate score write")]
    StaleScore {
        /// Revision currently persisted for the hole, if any.
        current_revision: Option<i64>,
    },
    /// Payload too large.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    /// Rate limit exceeded.
    #[error("{0}")]
    TooManyRequests(String),
    /// Tournament-safety interlock rejection.
    #[error("{0}")]
    Locked(String),
    /// Service unavailable or a required capability is disabled.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Forbidden(message) => AppError::Forbidden(message),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::Conflict(message) => AppError::Conflict(message),
            ServiceError::StaleScore { current_revision } => {
                AppError::StaleScore { current_revision }
            }
            ServiceError::PayloadTooLarge(message) => AppError::PayloadTooLarge(message),
            ServiceError::RateLimited(message) => AppError::TooManyRequests(message),
            ServiceError::SafetyBlocked(message) => AppError::Locked(message),
            ServiceError::Disabled(message) => AppError::ServiceUnavailable(message),
            ServiceError::Internal(message) => AppError::Internal(message),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {err}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::StaleScore { .. } => StatusCode::CONFLICT,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Locked(_) => StatusCode::LOCKED,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Conflict and safety rejections carry structured bodies clients key on.
        let payload = match &self {
            AppError::StaleScore { current_revision } => Json(json!({
                "reason": "STALE_OR_DUPLICATE",
                "currentRevision": current_revision,
            })),
            AppError::Locked(message) => Json(json!({
                "detail": { "code": "TOURNAMENT_SAFE", "message": message },
            })),
            other => Json(json!({ "message": other.to_string() })),
        };

        (status, payload).into_response()
    }
}
