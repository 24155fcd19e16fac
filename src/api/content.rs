/// Content generation endpoints
use crate::api::envelope::{ok, ok_empty, ok_page};
use crate::auth::AuthUser;
use crate::content::GenerateRequest;
use crate::context::AppContext;
use crate::error::ApiResult;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/content/generate", post(generate))
        .route("/api/content/history", get(history))
        .route(
            "/api/content/:id",
            get(detail).put(edit).delete(delete_record),
        )
        .route("/api/content/:id/regenerate", post(regenerate))
}

/// POST /api/content/generate
async fn generate(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<Json<Value>> {
    let success = ctx.content.generate(&user.user_id, request).await?;
    Ok(ok(success))
}

/// POST /api/content/:id/regenerate
async fn regenerate(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let success = ctx.content.regenerate(&user.user_id, &id).await?;
    Ok(ok(success))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryQuery {
    #[serde(default)]
    scenario_id: Option<String>,
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_page_size")]
    page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

/// GET /api/content/history
async fn history(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Value>> {
    let (records, total) = ctx
        .content
        .history(
            &user.user_id,
            query.scenario_id.as_deref(),
            query.page,
            query.page_size,
        )
        .await?;
    Ok(ok_page(records, total, query.page, query.page_size))
}

/// GET /api/content/:id
async fn detail(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let record = ctx.content.detail(&user.user_id, &id).await?;
    Ok(ok(record))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditRequest {
    edited_content: String,
}

/// PUT /api/content/:id
async fn edit(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<EditRequest>,
) -> ApiResult<Json<Value>> {
    let record = ctx
        .content
        .edit(&user.user_id, &id, &request.edited_content)
        .await?;
    Ok(ok(record))
}

/// DELETE /api/content/:id
async fn delete_record(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    ctx.content.delete(&user.user_id, &id).await?;
    Ok(ok_empty())
}
