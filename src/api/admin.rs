/// Keyword administration endpoints
///
/// Guarded by a deployment-level admin token rather than user roles.
/// With no token configured the endpoints are disabled.
use crate::api::envelope::{ok, ok_empty};
use crate::context::AppContext;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/api/admin/keywords",
            get(list_keywords).post(add_keyword).delete(remove_keyword),
        )
        .route("/api/admin/keywords/import", post(import_keywords))
}

fn require_admin(ctx: &AppContext, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = ctx.config.auth.admin_token.as_deref() else {
        return Err(ApiError::Forbidden(
            "Admin endpoints are disabled".to_string(),
        ));
    };

    let provided = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if provided.is_empty() || provided != expected {
        return Err(ApiError::Forbidden("Admin token required".to_string()));
    }
    Ok(())
}

/// GET /api/admin/keywords
async fn list_keywords(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    require_admin(&ctx, &headers)?;

    let keywords = ctx.moderation.keywords();
    let words = keywords.list().await?;
    Ok(ok(serde_json::json!({
        "words": words,
        "version": keywords.stored_version().await?,
    })))
}

#[derive(Debug, Deserialize)]
struct KeywordRequest {
    word: String,
}

/// POST /api/admin/keywords
async fn add_keyword(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(request): Json<KeywordRequest>,
) -> ApiResult<Json<Value>> {
    require_admin(&ctx, &headers)?;

    let added = ctx.moderation.keywords().add(&request.word).await?;
    Ok(ok(serde_json::json!({ "added": added })))
}

/// DELETE /api/admin/keywords
async fn remove_keyword(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(request): Json<KeywordRequest>,
) -> ApiResult<Json<Value>> {
    require_admin(&ctx, &headers)?;

    let removed = ctx.moderation.keywords().remove(&request.word).await?;
    if !removed {
        return Err(ApiError::NotFound("Keyword not found".to_string()));
    }
    Ok(ok_empty())
}

#[derive(Debug, Deserialize)]
struct ImportRequest {
    words: Vec<String>,
}

/// POST /api/admin/keywords/import
async fn import_keywords(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(request): Json<ImportRequest>,
) -> ApiResult<Json<Value>> {
    require_admin(&ctx, &headers)?;

    let imported = ctx.moderation.keywords().import(&request.words).await?;
    Ok(ok(serde_json::json!({ "imported": imported })))
}
