/// Order endpoints
use crate::api::envelope::{ok, ok_page};
use crate::auth::AuthUser;
use crate::context::AppContext;
use crate::db::models::MembershipTier;
use crate::error::{ApiError, ApiResult};
use crate::orders::OrderParams;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/orders", post(create_order).get(list_orders))
        .route("/api/orders/:order_no/status", get(order_status))
        .route("/api/orders/:order_no/pay", post(request_payment))
        .route("/api/orders/:order_no/cancel", post(cancel_order))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "orderType", rename_all = "SCREAMING_SNAKE_CASE")]
enum CreateOrderRequest {
    Membership { tier: MembershipTier },
    PayPerUse { quantity: i64 },
}

/// POST /api/orders
async fn create_order(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> ApiResult<Json<Value>> {
    let params = match request {
        CreateOrderRequest::Membership { tier } => OrderParams::Membership { tier },
        CreateOrderRequest::PayPerUse { quantity } => OrderParams::PayPerUse { quantity },
    };

    let order = ctx.orders.create_order(&user.user_id, params).await?;
    Ok(ok(order))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
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

/// GET /api/orders
async fn list_orders(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let (orders, total) = ctx
        .orders
        .list_for_user(&user.user_id, query.page, query.page_size)
        .await?;
    Ok(ok_page(orders, total, query.page, query.page_size))
}

/// GET /api/orders/:order_no/status
async fn order_status(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(order_no): Path<String>,
) -> ApiResult<Json<Value>> {
    let order = require_own_order(&ctx, &user, &order_no).await?;
    Ok(ok(serde_json::json!({
        "orderNo": order.order_no,
        "status": order.status,
        "paidAt": order.paid_at,
    })))
}

/// POST /api/orders/:order_no/pay
/// Create client payment parameters for a PENDING order
async fn request_payment(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(order_no): Path<String>,
) -> ApiResult<Json<Value>> {
    let payment = ctx
        .payment
        .as_ref()
        .ok_or_else(|| ApiError::Upstream("Payment is not configured".to_string()))?;

    let order = require_own_order(&ctx, &user, &order_no).await?;
    let profile = ctx.accounts.get_profile(&user.user_id).await?;

    let params = payment
        .create_client_payment(&order, &profile.open_id)
        .await?;
    Ok(ok(params))
}

/// POST /api/orders/:order_no/cancel
async fn cancel_order(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(order_no): Path<String>,
) -> ApiResult<Json<Value>> {
    require_own_order(&ctx, &user, &order_no).await?;
    let order = ctx.orders.cancel(&order_no).await?;
    Ok(ok(order))
}

async fn require_own_order(
    ctx: &AppContext,
    user: &AuthUser,
    order_no: &str,
) -> ApiResult<crate::db::models::Order> {
    let order = ctx
        .orders
        .get_by_order_no(order_no)
        .await?
        .ok_or_else(|| ApiError::NotFound("Order not found".to_string()))?;

    if order.user_id != user.user_id {
        return Err(ApiError::Forbidden("Not your order".to_string()));
    }
    Ok(order)
}
