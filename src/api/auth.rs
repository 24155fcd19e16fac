/// Authentication endpoints
use crate::api::envelope::ok;
use crate::context::AppContext;
use crate::error::ApiResult;
use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::Value;

pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/auth/login", post(login))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    code: String,
}

/// POST /api/auth/login
/// Exchange a platform login code for a user session
async fn login(
    State(ctx): State<AppContext>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<Value>> {
    let result = ctx.accounts.login_with_code(&request.code).await?;
    Ok(ok(result))
}
