/// Quota ledger behavior: dual-pool accounting, spend order, refunds
/// and concurrency
use chrono::{Duration, Utc};
use copymint::config::QuotaConfig;
use copymint::db::models::MembershipTier;
use copymint::error::ApiError;
use copymint::quota::{store::MemoryCounterStore, DeductedPool, QuotaLedger};
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

fn ledger(pool: SqlitePool, free_daily: i64) -> QuotaLedger {
    QuotaLedger::new(
        pool,
        Arc::new(MemoryCounterStore::new()),
        QuotaConfig {
            free_daily,
            monthly_daily: 50,
            yearly_daily: 99_999,
        },
    )
}

async fn insert_user(pool: &SqlitePool, id: &str, tier: MembershipTier, purchased: i64) {
    sqlx::query(
        "INSERT INTO users (id, open_id, membership_type, purchased_quota, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
    )
    .bind(id)
    .bind(format!("open-{}", id))
    .bind(tier)
    .bind(purchased)
    .bind(Utc::now())
    .execute(pool)
    .await
    .unwrap();
}

#[tokio::test]
async fn remaining_is_daily_headroom_plus_purchased() {
    let pool = test_pool().await;
    insert_user(&pool, "u1", MembershipTier::Free, 3).await;
    let ledger = ledger(pool, 5);

    let info = ledger.quota_info("u1").await.unwrap().unwrap();
    assert_eq!(info.daily_quota, 5);
    assert_eq!(info.used_today, 0);
    assert_eq!(info.purchased_quota, 3);
    assert_eq!(info.remaining_quota, 8);
}

#[tokio::test]
async fn deduct_spends_daily_pool_first() {
    let pool = test_pool().await;
    insert_user(&pool, "u1", MembershipTier::Free, 2).await;
    let ledger = ledger(pool.clone(), 1);

    assert_eq!(ledger.deduct_quota("u1").await.unwrap(), DeductedPool::Daily);
    assert_eq!(
        ledger.deduct_quota("u1").await.unwrap(),
        DeductedPool::Purchased
    );

    let purchased: i64 = sqlx::query_scalar("SELECT purchased_quota FROM users WHERE id = 'u1'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(purchased, 1);
}

#[tokio::test]
async fn deduct_fails_when_both_pools_empty() {
    let pool = test_pool().await;
    insert_user(&pool, "u1", MembershipTier::Free, 0).await;
    let ledger = ledger(pool, 1);

    ledger.deduct_quota("u1").await.unwrap();

    match ledger.deduct_quota("u1").await {
        Err(ApiError::QuotaExceeded {
            daily_quota,
            used_today,
            purchased_quota,
        }) => {
            assert_eq!(daily_quota, 1);
            assert_eq!(used_today, 1);
            assert_eq!(purchased_quota, 0);
        }
        other => panic!("expected QuotaExceeded, got {:?}", other),
    }
}

#[tokio::test]
async fn deduct_then_refund_restores_remaining() {
    let pool = test_pool().await;
    insert_user(&pool, "u1", MembershipTier::Free, 2).await;
    let ledger = ledger(pool, 5);

    let before = ledger.quota_info("u1").await.unwrap().unwrap().remaining_quota;
    ledger.deduct_quota("u1").await.unwrap();
    ledger.refund_quota("u1").await.unwrap();
    let after = ledger.quota_info("u1").await.unwrap().unwrap().remaining_quota;

    assert_eq!(before, after);
}

#[tokio::test]
async fn refund_with_no_daily_usage_grants_purchased() {
    let pool = test_pool().await;
    insert_user(&pool, "u1", MembershipTier::Free, 0).await;
    let ledger = ledger(pool.clone(), 5);

    ledger.refund_quota("u1").await.unwrap();

    let purchased: i64 = sqlx::query_scalar("SELECT purchased_quota FROM users WHERE id = 'u1'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(purchased, 1);
}

#[tokio::test]
async fn expired_membership_falls_back_to_free_allowance() {
    let pool = test_pool().await;
    insert_user(&pool, "u1", MembershipTier::Monthly, 0).await;
    sqlx::query("UPDATE users SET membership_expires_at = ?1 WHERE id = 'u1'")
        .bind(Utc::now() - Duration::days(1))
        .execute(&pool)
        .await
        .unwrap();
    let ledger = ledger(pool, 5);

    let info = ledger.quota_info("u1").await.unwrap().unwrap();
    assert_eq!(info.daily_quota, 5);
}

#[tokio::test]
async fn activate_membership_raises_allowance() {
    let pool = test_pool().await;
    insert_user(&pool, "u1", MembershipTier::Free, 0).await;
    let ledger = ledger(pool, 5);

    ledger
        .activate_membership("u1", MembershipTier::Monthly, 30)
        .await
        .unwrap();

    let info = ledger.quota_info("u1").await.unwrap().unwrap();
    assert_eq!(info.membership_type, MembershipTier::Monthly);
    assert_eq!(info.daily_quota, 50);
}

#[tokio::test]
async fn add_purchased_quota_rejects_non_positive() {
    let pool = test_pool().await;
    insert_user(&pool, "u1", MembershipTier::Free, 0).await;
    let ledger = ledger(pool, 5);

    assert!(ledger.add_purchased_quota("u1", 0).await.is_err());
    assert!(ledger.add_purchased_quota("u1", -3).await.is_err());
    ledger.add_purchased_quota("u1", 10).await.unwrap();

    let info = ledger.quota_info("u1").await.unwrap().unwrap();
    assert_eq!(info.purchased_quota, 10);
}

#[tokio::test]
async fn concurrent_deducts_cannot_overspend_last_unit() {
    let pool = test_pool().await;
    insert_user(&pool, "u1", MembershipTier::Free, 0).await;
    let ledger = Arc::new(ledger(pool, 1));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(
            async move { ledger.deduct_quota("u1").await },
        ));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            successes += 1;
        }
    }

    assert_eq!(successes, 1);
    let info = ledger.quota_info("u1").await.unwrap().unwrap();
    assert_eq!(info.remaining_quota, 0);
}
