/// Quota ledger
///
/// Tracks two pools of generation credits per user: a daily free
/// allowance keyed by membership tier (time-boxed counter, resets at
/// local midnight by key expiry) and a durable purchased balance on the
/// user row. Spend order is daily first — the daily pool resets for
/// free, purchased credits should survive as long as possible.
///
/// Invariant: remaining = max(0, daily_allowance - used_today) +
/// purchased_quota, never negative.

pub mod store;

use crate::config::QuotaConfig;
use crate::db::models::MembershipTier;
use crate::error::{ApiError, ApiResult};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use store::CounterStore;
use tracing::{info, warn};

/// Snapshot of a user's quota state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaInfo {
    pub user_id: String,
    pub daily_quota: i64,
    pub used_today: i64,
    pub remaining_quota: i64,
    pub purchased_quota: i64,
    pub membership_type: MembershipTier,
    pub membership_expires_at: Option<DateTime<Utc>>,
    pub reset_at: DateTime<Utc>,
}

/// Outcome of a quota check
#[derive(Debug, Clone, Serialize)]
pub struct QuotaCheck {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Which pool a deduction consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeductedPool {
    Daily,
    Purchased,
}

/// Quota ledger service
pub struct QuotaLedger {
    db: SqlitePool,
    counter: Arc<dyn CounterStore>,
    config: QuotaConfig,
}

impl QuotaLedger {
    pub fn new(db: SqlitePool, counter: Arc<dyn CounterStore>, config: QuotaConfig) -> Self {
        Self {
            db,
            counter,
            config,
        }
    }

    /// Full quota snapshot for a user, or None when the user is unknown
    pub async fn quota_info(&self, user_id: &str) -> ApiResult<Option<QuotaInfo>> {
        let row = sqlx::query(
            "SELECT membership_type, membership_expires_at, purchased_quota
             FROM users WHERE id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let membership_type: MembershipTier = row.try_get("membership_type")?;
        let membership_expires_at: Option<DateTime<Utc>> = row.try_get("membership_expires_at")?;
        let purchased_quota: i64 = row.try_get("purchased_quota")?;

        let daily_quota = self.daily_allowance(membership_type, membership_expires_at);
        let used_today = self.counter.get(&self.daily_key(user_id)).await?;
        let remaining_quota = (daily_quota - used_today).max(0) + purchased_quota;

        Ok(Some(QuotaInfo {
            user_id: user_id.to_string(),
            daily_quota,
            used_today,
            remaining_quota,
            purchased_quota,
            membership_type,
            membership_expires_at,
            reset_at: next_local_midnight_utc(),
        }))
    }

    /// Check whether the user may generate. Ledger-store errors
    /// propagate; they must never silently grant access.
    pub async fn check_quota(&self, user_id: &str) -> ApiResult<QuotaCheck> {
        let Some(info) = self.quota_info(user_id).await? else {
            return Ok(QuotaCheck {
                allowed: false,
                reason: Some("User not found".to_string()),
            });
        };

        if info.remaining_quota <= 0 {
            return Ok(QuotaCheck {
                allowed: false,
                reason: Some("Quota exceeded".to_string()),
            });
        }

        Ok(QuotaCheck {
            allowed: true,
            reason: None,
        })
    }

    /// Deduct one generation credit, daily pool first.
    ///
    /// The daily deduction is a single atomic increment-with-ceiling
    /// against the counter store, so two concurrent requests racing for
    /// the last daily unit cannot both win it. The purchased deduction
    /// is a conditional single-statement update with the same property.
    pub async fn deduct_quota(&self, user_id: &str) -> ApiResult<DeductedPool> {
        let Some(info) = self.quota_info(user_id).await? else {
            return Err(ApiError::NotFound("User not found".to_string()));
        };

        if info.remaining_quota <= 0 {
            return Err(self.exceeded(&info));
        }

        let ttl = seconds_until_local_midnight();
        if self
            .counter
            .incr_with_ceiling(&self.daily_key(user_id), info.daily_quota, ttl)
            .await?
        {
            info!(
                user_id,
                pool = "daily",
                remaining = info.remaining_quota - 1,
                "quota deducted"
            );
            return Ok(DeductedPool::Daily);
        }

        // Daily pool exhausted (possibly by a concurrent request since
        // the snapshot above); fall through to the purchased pool.
        let result = sqlx::query(
            "UPDATE users SET purchased_quota = purchased_quota - 1
             WHERE id = ?1 AND purchased_quota > 0",
        )
        .bind(user_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.exceeded(&info));
        }

        info!(user_id, pool = "purchased", "quota deducted");
        Ok(DeductedPool::Purchased)
    }

    /// Reverse the most recent deduction: today's counter if positive,
    /// otherwise the purchased balance. Best-effort compensation, not a
    /// transactional rollback — concurrent refunds for the same user
    /// may under-count usage by one, which only overgrants quota.
    pub async fn refund_quota(&self, user_id: &str) -> ApiResult<()> {
        if self.counter.decr_floor(&self.daily_key(user_id)).await? {
            info!(user_id, pool = "daily", "quota refunded");
            return Ok(());
        }

        sqlx::query("UPDATE users SET purchased_quota = purchased_quota + 1 WHERE id = ?1")
            .bind(user_id)
            .execute(&self.db)
            .await?;

        info!(user_id, pool = "purchased", "quota refunded");
        Ok(())
    }

    /// Monotonic purchased-credit grant; payment activation path only
    pub async fn add_purchased_quota(&self, user_id: &str, amount: i64) -> ApiResult<()> {
        self.add_purchased_quota_on(&self.db, user_id, amount).await
    }

    /// Grant against a caller-supplied executor, so payment settlement
    /// can tie the grant to the activation claim transactionally
    pub async fn add_purchased_quota_on<'e, E>(
        &self,
        executor: E,
        user_id: &str,
        amount: i64,
    ) -> ApiResult<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        if amount <= 0 {
            return Err(ApiError::Validation(
                "Quota grant must be positive".to_string(),
            ));
        }

        let result =
            sqlx::query("UPDATE users SET purchased_quota = purchased_quota + ?1 WHERE id = ?2")
                .bind(amount)
                .bind(user_id)
                .execute(executor)
                .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("User not found".to_string()));
        }

        info!(user_id, amount, "purchased quota granted");
        Ok(())
    }

    /// Membership grant; payment activation path only
    pub async fn activate_membership(
        &self,
        user_id: &str,
        tier: MembershipTier,
        duration_days: i64,
    ) -> ApiResult<()> {
        self.activate_membership_on(&self.db, user_id, tier, duration_days)
            .await
    }

    /// Membership grant against a caller-supplied executor
    pub async fn activate_membership_on<'e, E>(
        &self,
        executor: E,
        user_id: &str,
        tier: MembershipTier,
        duration_days: i64,
    ) -> ApiResult<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let expires_at = Utc::now() + chrono::Duration::days(duration_days);

        let result = sqlx::query(
            "UPDATE users SET membership_type = ?1, membership_expires_at = ?2, updated_at = ?3
             WHERE id = ?4",
        )
        .bind(tier)
        .bind(expires_at)
        .bind(Utc::now())
        .bind(user_id)
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("User not found".to_string()));
        }

        info!(
            user_id,
            tier = tier.as_str(),
            %expires_at,
            "membership activated"
        );
        Ok(())
    }

    /// Per-day used counts for the trailing window
    pub async fn usage_stats(&self, user_id: &str, days: u32) -> ApiResult<Vec<(String, i64)>> {
        let mut stats = Vec::with_capacity(days as usize);
        let today = Local::now().date_naive();

        for offset in 0..days {
            let Some(date) = today.checked_sub_days(chrono::Days::new(offset as u64)) else {
                continue;
            };
            let key = format!("{}:{}", user_id, date.format("%Y-%m-%d"));
            let used = self.counter.get(&key).await?;
            stats.push((date.format("%Y-%m-%d").to_string(), used));
        }

        Ok(stats)
    }

    fn exceeded(&self, info: &QuotaInfo) -> ApiError {
        warn!(
            user_id = %info.user_id,
            used_today = info.used_today,
            daily_quota = info.daily_quota,
            purchased = info.purchased_quota,
            "quota exhausted"
        );
        ApiError::QuotaExceeded {
            daily_quota: info.daily_quota,
            used_today: info.used_today,
            purchased_quota: info.purchased_quota,
        }
    }

    /// Daily allowance by tier; an expired membership falls back to FREE
    fn daily_allowance(&self, tier: MembershipTier, expires_at: Option<DateTime<Utc>>) -> i64 {
        if let Some(expiry) = expires_at {
            if expiry < Utc::now() {
                return self.config.free_daily;
            }
        }

        match tier {
            MembershipTier::Free => self.config.free_daily,
            MembershipTier::Monthly => self.config.monthly_daily,
            MembershipTier::Yearly => self.config.yearly_daily,
        }
    }

    /// Counter key for today, server-local calendar day
    fn daily_key(&self, user_id: &str) -> String {
        format!(
            "{}:{}",
            user_id,
            Local::now().date_naive().format("%Y-%m-%d")
        )
    }
}

/// Seconds until the start of the next server-local calendar day
fn seconds_until_local_midnight() -> i64 {
    let now = Local::now();
    match now
        .date_naive()
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        Some(midnight) => (midnight - now.naive_local()).num_seconds().max(1),
        None => 86_400,
    }
}

/// Next local midnight expressed in UTC, for client display
fn next_local_midnight_utc() -> DateTime<Utc> {
    Utc::now() + chrono::Duration::seconds(seconds_until_local_midnight())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_until_local_midnight_in_range() {
        let secs = seconds_until_local_midnight();
        assert!(secs >= 1);
        assert!(secs <= 86_400);
    }
}
