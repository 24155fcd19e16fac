/// User profile and quota endpoints
use crate::account::ProfileUpdate;
use crate::api::envelope::ok;
use crate::auth::AuthUser;
use crate::context::AppContext;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Query, State},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/user/profile", get(get_profile).put(update_profile))
        .route("/api/user/quota", get(get_quota))
        .route("/api/user/usage", get(get_usage))
        .route(
            "/api/user/quota/check",
            put(check_quota).get(check_quota),
        )
}

/// GET /api/user/profile
async fn get_profile(State(ctx): State<AppContext>, user: AuthUser) -> ApiResult<Json<Value>> {
    let profile = ctx.accounts.get_profile(&user.user_id).await?;
    Ok(ok(profile))
}

/// PUT /api/user/profile
async fn update_profile(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<Value>> {
    let profile = ctx.accounts.update_profile(&user.user_id, update).await?;
    Ok(ok(profile))
}

/// GET /api/user/quota
async fn get_quota(State(ctx): State<AppContext>, user: AuthUser) -> ApiResult<Json<Value>> {
    let info = ctx
        .quota
        .quota_info(&user.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(ok(info))
}

/// GET|PUT /api/user/quota/check
async fn check_quota(State(ctx): State<AppContext>, user: AuthUser) -> ApiResult<Json<Value>> {
    let check = ctx.quota.check_quota(&user.user_id).await?;
    Ok(ok(check))
}

#[derive(Debug, Deserialize)]
struct UsageQuery {
    #[serde(default = "default_days")]
    days: u32,
}

fn default_days() -> u32 {
    7
}

/// GET /api/user/usage?days=7
async fn get_usage(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Query(query): Query<UsageQuery>,
) -> ApiResult<Json<Value>> {
    let days = query.days.clamp(1, 90);
    let daily = ctx.quota.usage_stats(&user.user_id, days).await?;
    let summary = ctx.analytics.user_summary(&user.user_id, days as i64).await?;

    Ok(ok(serde_json::json!({
        "daily": daily
            .into_iter()
            .map(|(date, used)| serde_json::json!({ "date": date, "used": used }))
            .collect::<Vec<_>>(),
        "summary": summary,
    })))
}
