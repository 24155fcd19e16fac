/// Feedback endpoints
use crate::api::envelope::ok;
use crate::auth::AuthUser;
use crate::context::AppContext;
use crate::error::ApiResult;
use crate::feedback::FeedbackSubmission;
use axum::{extract::State, routing::post, Json, Router};
use serde_json::Value;

pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/feedback", post(submit).get(list))
}

/// POST /api/feedback
async fn submit(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Json(submission): Json<FeedbackSubmission>,
) -> ApiResult<Json<Value>> {
    let entry = ctx.feedback.submit(&user.user_id, submission).await?;
    Ok(ok(entry))
}

/// GET /api/feedback
async fn list(State(ctx): State<AppContext>, user: AuthUser) -> ApiResult<Json<Value>> {
    let entries = ctx.feedback.list_for_user(&user.user_id).await?;
    Ok(ok(entries))
}
