/// Order lifecycle management
///
/// Orders move PENDING -> PAID -> REFUNDED, or PENDING -> CANCELLED;
/// nothing else is legal. `mark_paid` and `claim_activation` are the
/// two places that must stay correct under concurrent payment-webhook
/// deliveries, so both are single conditional updates gated on the
/// current state rather than read-then-write sequences.
use crate::config::PricingConfig;
use crate::db::models::{MembershipTier, Order, OrderStatus, OrderType};
use crate::error::{ApiError, ApiResult};
use chrono::{Duration, Local, Utc};
use rand::Rng;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

const ORDER_NO_RANDOM_LEN: usize = 6;
const ORDER_NO_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ORDER_NO_MAX_ATTEMPTS: usize = 3;

/// Parameters for creating an order
#[derive(Debug, Clone)]
pub enum OrderParams {
    Membership { tier: MembershipTier },
    PayPerUse { quantity: i64 },
}

/// Order service
pub struct OrderService {
    db: SqlitePool,
    pricing: PricingConfig,
}

impl OrderService {
    pub fn new(db: SqlitePool, pricing: PricingConfig) -> Self {
        Self { db, pricing }
    }

    /// Create a PENDING order with an amount from the fixed price table
    pub async fn create_order(&self, user_id: &str, params: OrderParams) -> ApiResult<Order> {
        let (order_type, membership_type, quantity, amount_cents) = match params {
            OrderParams::Membership { tier } => {
                let amount = match tier {
                    MembershipTier::Monthly => self.pricing.monthly_cents,
                    MembershipTier::Yearly => self.pricing.yearly_cents,
                    MembershipTier::Free => {
                        return Err(ApiError::Validation(
                            "Cannot create an order for the FREE tier".to_string(),
                        ))
                    }
                };
                (OrderType::Membership, Some(tier), 1i64, amount)
            }
            OrderParams::PayPerUse { quantity } => {
                if quantity <= 0 {
                    return Err(ApiError::Validation(
                        "Quantity must be positive".to_string(),
                    ));
                }
                (
                    OrderType::PayPerUse,
                    None,
                    quantity,
                    quantity * self.pricing.per_use_cents,
                )
            }
        };

        // The order number carries a second-resolution timestamp plus a
        // random suffix; the unique index makes the rare collision a
        // retryable insert conflict.
        let mut last_err: Option<sqlx::Error> = None;
        for _ in 0..ORDER_NO_MAX_ATTEMPTS {
            let order_no = generate_order_no();
            let id = Uuid::new_v4().to_string();
            let now = Utc::now();

            let result = sqlx::query(
                "INSERT INTO orders
                 (id, order_no, user_id, order_type, membership_type, quantity, amount_cents, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .bind(&id)
            .bind(&order_no)
            .bind(user_id)
            .bind(order_type)
            .bind(membership_type)
            .bind(quantity)
            .bind(amount_cents)
            .bind(OrderStatus::Pending)
            .bind(now)
            .execute(&self.db)
            .await;

            match result {
                Ok(_) => {
                    info!(user_id, order_no, amount_cents, "order created");
                    return self
                        .get_by_order_no(&order_no)
                        .await?
                        .ok_or_else(|| ApiError::Internal("Order vanished after insert".into()));
                }
                Err(e) if is_unique_violation(&e) => {
                    warn!(order_no, "order number collision, retrying");
                    last_err = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ApiError::Internal(format!(
            "Order number generation exhausted retries: {}",
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Transition a PENDING order to PAID. Idempotent: an already-PAID
    /// order is returned unchanged even when the transaction id differs
    /// (first-writer-wins, logged); any other state is an invalid
    /// transition. Safe under concurrent webhook deliveries because the
    /// transition is one conditional update.
    pub async fn mark_paid(&self, order_no: &str, transaction_id: &str) -> ApiResult<Order> {
        let result = sqlx::query(
            "UPDATE orders SET status = ?1, transaction_id = ?2, paid_at = ?3
             WHERE order_no = ?4 AND status = ?5",
        )
        .bind(OrderStatus::Paid)
        .bind(transaction_id)
        .bind(Utc::now())
        .bind(order_no)
        .bind(OrderStatus::Pending)
        .execute(&self.db)
        .await?;

        let order = self
            .get_by_order_no(order_no)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Order {} not found", order_no)))?;

        if result.rows_affected() == 1 {
            info!(order_no, transaction_id, "order marked as paid");
            return Ok(order);
        }

        // We lost the conditional update: either a duplicate webhook
        // already paid the order, or it is in a terminal state.
        match order.status {
            OrderStatus::Paid => {
                if order.transaction_id.as_deref() != Some(transaction_id) {
                    warn!(
                        order_no,
                        existing = order.transaction_id.as_deref().unwrap_or(""),
                        incoming = transaction_id,
                        "duplicate payment notification with differing transaction id"
                    );
                }
                Ok(order)
            }
            other => Err(ApiError::InvalidTransition(format!(
                "Order {} is {}, cannot mark as paid",
                order_no,
                other.as_str()
            ))),
        }
    }

    /// Claim the one-time activation of a PAID order. Returns true
    /// exactly once per order; the caller grants membership or quota
    /// only on a winning claim, which makes activation idempotent
    /// independent of order-status idempotency.
    pub async fn claim_activation(&self, order_no: &str) -> ApiResult<bool> {
        self.claim_activation_on(&self.db, order_no).await
    }

    /// Same claim against a caller-supplied executor, so settlement can
    /// run the claim and its grant in one transaction.
    pub async fn claim_activation_on<'e, E>(&self, executor: E, order_no: &str) -> ApiResult<bool>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE orders SET activated_at = ?1
             WHERE order_no = ?2 AND status = ?3 AND activated_at IS NULL",
        )
        .bind(Utc::now())
        .bind(order_no)
        .bind(OrderStatus::Paid)
        .execute(executor)
        .await?;

        let claimed = result.rows_affected() == 1;
        if claimed {
            info!(order_no, "activation claimed");
        }
        Ok(claimed)
    }

    /// Cancel a PENDING order
    pub async fn cancel(&self, order_no: &str) -> ApiResult<Order> {
        let result = sqlx::query("UPDATE orders SET status = ?1 WHERE order_no = ?2 AND status = ?3")
            .bind(OrderStatus::Cancelled)
            .bind(order_no)
            .bind(OrderStatus::Pending)
            .execute(&self.db)
            .await?;

        let order = self
            .get_by_order_no(order_no)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Order {} not found", order_no)))?;

        if result.rows_affected() == 0 && order.status != OrderStatus::Cancelled {
            return Err(ApiError::InvalidTransition(format!(
                "Order {} is {}, cannot cancel",
                order_no,
                order.status.as_str()
            )));
        }

        info!(order_no, "order cancelled");
        Ok(order)
    }

    /// Refund a PAID order
    pub async fn refund(&self, order_no: &str, reason: &str) -> ApiResult<Order> {
        let result = sqlx::query(
            "UPDATE orders SET status = ?1, refunded_at = ?2, refund_reason = ?3
             WHERE order_no = ?4 AND status = ?5",
        )
        .bind(OrderStatus::Refunded)
        .bind(Utc::now())
        .bind(reason)
        .bind(order_no)
        .bind(OrderStatus::Paid)
        .execute(&self.db)
        .await?;

        let order = self
            .get_by_order_no(order_no)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Order {} not found", order_no)))?;

        if result.rows_affected() == 0 && order.status != OrderStatus::Refunded {
            return Err(ApiError::InvalidTransition(format!(
                "Order {} is {}, cannot refund",
                order_no,
                order.status.as_str()
            )));
        }

        info!(order_no, reason, "order refunded");
        Ok(order)
    }

    /// Cancel PENDING orders older than the timeout; background job
    pub async fn expire_stale(&self, older_than: Duration) -> ApiResult<u64> {
        let cutoff = Utc::now() - older_than;

        let result = sqlx::query("UPDATE orders SET status = ?1 WHERE status = ?2 AND created_at < ?3")
            .bind(OrderStatus::Cancelled)
            .bind(OrderStatus::Pending)
            .bind(cutoff)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// Look up by order number
    pub async fn get_by_order_no(&self, order_no: &str) -> ApiResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_no = ?1")
            .bind(order_no)
            .fetch_optional(&self.db)
            .await?;
        Ok(order)
    }

    /// Look up by id, enforcing ownership
    pub async fn get_for_user(&self, order_id: &str, user_id: &str) -> ApiResult<Order> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?1")
            .bind(order_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| ApiError::NotFound("Order not found".to_string()))?;

        if order.user_id != user_id {
            return Err(ApiError::Forbidden("Not your order".to_string()));
        }
        Ok(order)
    }

    /// Page a user's orders, newest first
    pub async fn list_for_user(
        &self,
        user_id: &str,
        page: i64,
        page_size: i64,
    ) -> ApiResult<(Vec<Order>, i64)> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let offset = (page - 1) * page_size;

        let orders = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE user_id = ?1
             ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
        )
        .bind(user_id)
        .bind(page_size)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = ?1")
            .bind(user_id)
            .fetch_one(&self.db)
            .await?;

        Ok((orders, total))
    }
}

/// Order number: local `yyyyMMddHHmmss` plus a 6-character random
/// uppercase alphanumeric suffix
pub fn generate_order_no() -> String {
    let timestamp = Local::now().format("%Y%m%d%H%M%S");
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ORDER_NO_RANDOM_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..ORDER_NO_CHARSET.len());
            ORDER_NO_CHARSET[idx] as char
        })
        .collect();
    format!("{}{}", timestamp, suffix)
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|d| d.is_unique_violation())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_no_shape() {
        let order_no = generate_order_no();
        assert_eq!(order_no.len(), 20);
        assert!(order_no[..14].chars().all(|c| c.is_ascii_digit()));
        assert!(order_no[14..]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_order_numbers_are_unique() {
        use std::collections::HashSet;
        let numbers: HashSet<String> = (0..200).map(|_| generate_order_no()).collect();
        assert_eq!(numbers.len(), 200);
    }
}
