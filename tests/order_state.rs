/// Order lifecycle: legal transitions, webhook idempotency and stale
/// expiry
use chrono::{Duration, Utc};
use copymint::config::PricingConfig;
use copymint::db::models::{MembershipTier, Order, OrderStatus};
use copymint::error::ApiError;
use copymint::orders::{OrderParams, OrderService};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn pricing() -> PricingConfig {
    PricingConfig {
        monthly_cents: 2990,
        yearly_cents: 19_900,
        per_use_cents: 200,
        order_timeout_minutes: 30,
    }
}

async fn insert_user(pool: &SqlitePool, id: &str) {
    sqlx::query(
        "INSERT INTO users (id, open_id, membership_type, purchased_quota, created_at, updated_at)
         VALUES (?1, ?2, 'FREE', 0, ?3, ?3)",
    )
    .bind(id)
    .bind(format!("open-{}", id))
    .bind(Utc::now())
    .execute(pool)
    .await
    .unwrap();
}

async fn paid_order(service: &OrderService, user_id: &str) -> Order {
    let order = service
        .create_order(
            user_id,
            OrderParams::Membership {
                tier: MembershipTier::Monthly,
            },
        )
        .await
        .unwrap();
    service.mark_paid(&order.order_no, "tx-1").await.unwrap()
}

#[tokio::test]
async fn create_order_prices_from_the_table() {
    let pool = test_pool().await;
    insert_user(&pool, "u1").await;
    let service = OrderService::new(pool, pricing());

    let membership = service
        .create_order(
            "u1",
            OrderParams::Membership {
                tier: MembershipTier::Yearly,
            },
        )
        .await
        .unwrap();
    assert_eq!(membership.amount_cents, 19_900);
    assert_eq!(membership.status, OrderStatus::Pending);

    let pay_per_use = service
        .create_order("u1", OrderParams::PayPerUse { quantity: 5 })
        .await
        .unwrap();
    assert_eq!(pay_per_use.amount_cents, 1000);
    assert_eq!(pay_per_use.quantity, 5);
}

#[tokio::test]
async fn create_order_rejects_free_tier_and_bad_quantity() {
    let pool = test_pool().await;
    insert_user(&pool, "u1").await;
    let service = OrderService::new(pool, pricing());

    assert!(matches!(
        service
            .create_order(
                "u1",
                OrderParams::Membership {
                    tier: MembershipTier::Free
                }
            )
            .await,
        Err(ApiError::Validation(_))
    ));
    assert!(matches!(
        service
            .create_order("u1", OrderParams::PayPerUse { quantity: 0 })
            .await,
        Err(ApiError::Validation(_))
    ));
}

#[tokio::test]
async fn mark_paid_is_idempotent() {
    let pool = test_pool().await;
    insert_user(&pool, "u1").await;
    let service = OrderService::new(pool, pricing());

    let order = service
        .create_order(
            "u1",
            OrderParams::Membership {
                tier: MembershipTier::Monthly,
            },
        )
        .await
        .unwrap();

    let first = service.mark_paid(&order.order_no, "tx-1").await.unwrap();
    assert_eq!(first.status, OrderStatus::Paid);
    assert_eq!(first.transaction_id.as_deref(), Some("tx-1"));

    // Duplicate delivery, even with a differing transaction id, keeps
    // the first writer's state
    let second = service.mark_paid(&order.order_no, "tx-2").await.unwrap();
    assert_eq!(second.status, OrderStatus::Paid);
    assert_eq!(second.transaction_id.as_deref(), Some("tx-1"));
}

#[tokio::test]
async fn mark_paid_rejects_terminal_states() {
    let pool = test_pool().await;
    insert_user(&pool, "u1").await;
    let service = OrderService::new(pool, pricing());

    let order = service
        .create_order(
            "u1",
            OrderParams::Membership {
                tier: MembershipTier::Monthly,
            },
        )
        .await
        .unwrap();
    service.cancel(&order.order_no).await.unwrap();

    assert!(matches!(
        service.mark_paid(&order.order_no, "tx-1").await,
        Err(ApiError::InvalidTransition(_))
    ));
}

#[tokio::test]
async fn concurrent_mark_paid_has_one_winner() {
    let pool = test_pool().await;
    insert_user(&pool, "u1").await;
    let service = Arc::new(OrderService::new(pool, pricing()));

    let order = service
        .create_order(
            "u1",
            OrderParams::Membership {
                tier: MembershipTier::Monthly,
            },
        )
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        let service = Arc::clone(&service);
        let order_no = order.order_no.clone();
        handles.push(tokio::spawn(async move {
            service.mark_paid(&order_no, &format!("tx-{}", i)).await
        }));
    }

    let mut transaction_ids = Vec::new();
    for handle in handles {
        let order = handle.await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        transaction_ids.push(order.transaction_id.unwrap());
    }

    // Every delivery observed the same winning transaction
    let final_order = service
        .get_by_order_no(&order.order_no)
        .await
        .unwrap()
        .unwrap();
    let winner = final_order.transaction_id.unwrap();
    assert!(transaction_ids.iter().all(|id| *id == winner));
}

#[tokio::test]
async fn activation_claim_succeeds_exactly_once() {
    let pool = test_pool().await;
    insert_user(&pool, "u1").await;
    let service = OrderService::new(pool, pricing());

    let order = paid_order(&service, "u1").await;

    assert!(service.claim_activation(&order.order_no).await.unwrap());
    assert!(!service.claim_activation(&order.order_no).await.unwrap());
}

#[tokio::test]
async fn refund_requires_paid_state() {
    let pool = test_pool().await;
    insert_user(&pool, "u1").await;
    let service = OrderService::new(pool, pricing());

    let pending = service
        .create_order(
            "u1",
            OrderParams::Membership {
                tier: MembershipTier::Monthly,
            },
        )
        .await
        .unwrap();
    assert!(matches!(
        service.refund(&pending.order_no, "test").await,
        Err(ApiError::InvalidTransition(_))
    ));

    let paid = paid_order(&service, "u1").await;
    let refunded = service.refund(&paid.order_no, "test").await.unwrap();
    assert_eq!(refunded.status, OrderStatus::Refunded);
    assert_eq!(refunded.refund_reason.as_deref(), Some("test"));
}

#[tokio::test]
async fn cancel_requires_pending_state() {
    let pool = test_pool().await;
    insert_user(&pool, "u1").await;
    let service = OrderService::new(pool, pricing());

    let paid = paid_order(&service, "u1").await;
    assert!(matches!(
        service.cancel(&paid.order_no).await,
        Err(ApiError::InvalidTransition(_))
    ));
}

#[tokio::test]
async fn expire_stale_only_touches_old_pending_orders() {
    let pool = test_pool().await;
    insert_user(&pool, "u1").await;
    let service = OrderService::new(pool.clone(), pricing());

    let stale = service
        .create_order(
            "u1",
            OrderParams::Membership {
                tier: MembershipTier::Monthly,
            },
        )
        .await
        .unwrap();
    sqlx::query("UPDATE orders SET created_at = ?1 WHERE order_no = ?2")
        .bind(Utc::now() - Duration::hours(2))
        .bind(&stale.order_no)
        .execute(&pool)
        .await
        .unwrap();

    let fresh = service
        .create_order("u1", OrderParams::PayPerUse { quantity: 1 })
        .await
        .unwrap();
    let paid = paid_order(&service, "u1").await;

    let cancelled = service.expire_stale(Duration::minutes(30)).await.unwrap();
    assert_eq!(cancelled, 1);

    let stale = service.get_by_order_no(&stale.order_no).await.unwrap().unwrap();
    assert_eq!(stale.status, OrderStatus::Cancelled);
    let fresh = service.get_by_order_no(&fresh.order_no).await.unwrap().unwrap();
    assert_eq!(fresh.status, OrderStatus::Pending);
    let paid = service.get_by_order_no(&paid.order_no).await.unwrap().unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);
}
