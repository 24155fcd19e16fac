/// Request authentication
///
/// Handlers take `AuthUser` as an extractor; it pulls the bearer token
/// from the Authorization header and verifies it against the JWT
/// secret in the shared context.
use crate::account;
use crate::context::AppContext;
use crate::error::ApiError;
use axum::{extract::FromRequestParts, http::request::Parts};

/// The authenticated caller
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

#[axum::async_trait]
impl FromRequestParts<AppContext> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

        let user_id = account::verify_token(token, &state.config.auth.jwt_secret)?;
        Ok(AuthUser { user_id })
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
