/// Payment webhook
use crate::context::AppContext;
use crate::db::models::{MembershipTier, Order, OrderType};
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::payment::{fail_xml, success_xml, NotifyOutcome};
use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use tracing::{error, info, warn};

const MONTHLY_DAYS: i64 = 30;
const YEARLY_DAYS: i64 = 365;

pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/payment/notify", post(notify))
}

/// POST /api/payment/notify
/// Asynchronous payment notification from the gateway. Replies with
/// the gateway's XML ack format; FAIL makes the gateway retry later.
async fn notify(State(ctx): State<AppContext>, body: String) -> Response {
    let Some(gateway) = &ctx.payment else {
        return xml_response(fail_xml("Payment not configured"));
    };

    match gateway.parse_notification(&body) {
        NotifyOutcome::BadSignature => {
            metrics::PAYMENT_NOTIFY_TOTAL
                .with_label_values(&["bad_signature"])
                .inc();
            xml_response(fail_xml("Signature verification failed"))
        }
        NotifyOutcome::Failed(message) => {
            metrics::PAYMENT_NOTIFY_TOTAL
                .with_label_values(&["failed"])
                .inc();
            warn!(message, "gateway reported payment failure");
            // Nothing to retry; acknowledge so the gateway stops
            xml_response(success_xml())
        }
        NotifyOutcome::Paid(notification) => {
            match settle_payment(&ctx, &notification.order_no, &notification.transaction_id).await
            {
                Ok(applied) => {
                    let outcome = if applied { "paid" } else { "duplicate" };
                    metrics::PAYMENT_NOTIFY_TOTAL
                        .with_label_values(&[outcome])
                        .inc();
                    xml_response(success_xml())
                }
                Err(e) => {
                    metrics::PAYMENT_NOTIFY_TOTAL
                        .with_label_values(&["error"])
                        .inc();
                    error!(order_no = %notification.order_no, error = %e, "payment settlement failed");
                    xml_response(fail_xml("Settlement failed"))
                }
            }
        }
    }
}

/// Mark the order paid and apply its grant exactly once. Returns true
/// when this delivery applied the grant, false for duplicates.
async fn settle_payment(
    ctx: &AppContext,
    order_no: &str,
    transaction_id: &str,
) -> ApiResult<bool> {
    let order = ctx.orders.mark_paid(order_no, transaction_id).await?;

    // The claim and the grant commit together: when the grant fails,
    // the claim rolls back and the gateway's retry can still settle.
    let mut tx = ctx.db.begin().await?;

    // Duplicate deliveries lose the activation claim and change nothing
    if !ctx.orders.claim_activation_on(&mut *tx, order_no).await? {
        info!(order_no, "duplicate payment notification, grant already applied");
        return Ok(false);
    }

    apply_grant(ctx, &mut tx, &order).await?;
    tx.commit().await?;

    info!(order_no, transaction_id, "payment settled");
    Ok(true)
}

async fn apply_grant(
    ctx: &AppContext,
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    order: &Order,
) -> ApiResult<()> {
    match order.order_type {
        OrderType::Membership => {
            let tier = order.membership_type.ok_or_else(|| {
                ApiError::Internal(format!(
                    "Membership order {} has no tier",
                    order.order_no
                ))
            })?;
            let days = match tier {
                MembershipTier::Yearly => YEARLY_DAYS,
                _ => MONTHLY_DAYS,
            };
            ctx.quota
                .activate_membership_on(&mut **tx, &order.user_id, tier, days)
                .await
        }
        OrderType::PayPerUse => {
            ctx.quota
                .add_purchased_quota_on(&mut **tx, &order.user_id, order.quantity)
                .await
        }
    }
}

fn xml_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, "text/xml")], body).into_response()
}
