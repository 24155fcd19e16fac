/// Scenario and tone-style catalog endpoints
use crate::api::envelope::ok;
use crate::context::AppContext;
use crate::error::ApiResult;
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde_json::Value;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/scenarios", get(list_scenarios))
        .route("/api/scenarios/:id", get(get_scenario))
        .route("/api/tone-styles", get(list_tone_styles))
}

/// GET /api/scenarios
async fn list_scenarios(State(ctx): State<AppContext>) -> ApiResult<Json<Value>> {
    let scenarios = ctx.catalog.list_scenarios().await?;
    Ok(ok(scenarios))
}

/// GET /api/scenarios/:id
async fn get_scenario(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let scenario = ctx.catalog.get_scenario(&id).await?;
    Ok(ok(scenario))
}

/// GET /api/tone-styles
async fn list_tone_styles(State(ctx): State<AppContext>) -> ApiResult<Json<Value>> {
    let styles = ctx.catalog.list_tone_styles().await?;
    Ok(ok(styles))
}
