/// Background task implementations
use crate::context::AppContext;
use crate::error::ApiResult;
use chrono::Duration;

/// Cancel PENDING orders older than the configured payment timeout
pub async fn expire_stale_orders(ctx: &AppContext) -> ApiResult<u64> {
    let timeout = Duration::minutes(ctx.config.pricing.order_timeout_minutes);
    ctx.orders.expire_stale(timeout).await
}

/// Recompile the keyword matcher when its stored version moved
pub async fn sync_keywords(ctx: &AppContext) -> ApiResult<bool> {
    ctx.moderation.keywords().sync_if_stale().await
}
