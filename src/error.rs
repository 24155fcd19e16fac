/// Unified error types for the Copymint backend
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum ApiError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Cache / counter store errors
    #[error("Cache error: {0}")]
    Cache(String),

    /// Authentication errors (missing or invalid credential)
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Authorization errors (valid credential, wrong owner/role)
    #[error("Not authorized: {0}")]
    Forbidden(String),

    /// Validation errors (client-caused)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Daily + purchased quota exhausted
    #[error("Quota exceeded")]
    QuotaExceeded {
        daily_quota: i64,
        used_today: i64,
        purchased_quota: i64,
    },

    /// Illegal order state transition
    #[error("Invalid order transition: {0}")]
    InvalidTransition(String),

    /// All generation providers exhausted
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// Content rejected by the safety check
    #[error("Content rejected: {0}")]
    ModerationRejected(String),

    /// Upstream service failures (payment gateway, identity provider)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Rate limiting
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error response body using the uniform `{code, message}` envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: i32,
    pub message: String,
}

/// Convert ApiError to HTTP response
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Quota exhaustion carries the current usage so the client can
        // drive an upgrade prompt.
        if let ApiError::QuotaExceeded {
            daily_quota,
            used_today,
            purchased_quota,
        } = &self
        {
            let body = Json(json!({
                "code": -1,
                "message": "Quota exceeded",
                "data": {
                    "dailyQuota": daily_quota,
                    "usedToday": used_today,
                    "purchasedQuota": purchased_quota,
                }
            }));
            return (StatusCode::FORBIDDEN, body).into_response();
        }

        let (status, message) = match &self {
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::InvalidTransition(_) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::GenerationFailed(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            ApiError::ModerationRejected(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            ApiError::RateLimitExceeded => (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded".to_string(),
            ),
            ApiError::Database(_) | ApiError::Cache(_) | ApiError::Internal(_) | ApiError::Io(_) => {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(), // Don't leak details
                )
            }
            ApiError::QuotaExceeded { .. } => unreachable!(),
        };

        let body = Json(ErrorEnvelope { code: -1, message });
        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type ApiResult<T> = Result<T, ApiError>;
