/// Generation analytics
///
/// One row per attempt in `generation_stats`, plus Prometheus
/// counters. Recording is fire-and-forget from the pipeline's point of
/// view: an analytics failure is logged, never surfaced.
use crate::error::ApiResult;
use crate::metrics;
use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::warn;

/// One generation attempt
pub struct GenerationEvent<'a> {
    pub user_id: &'a str,
    pub scenario_slug: &'a str,
    pub tone_style: &'a str,
    pub duration_ms: i64,
    pub success: bool,
    pub provider: &'a str,
}

/// Aggregated usage over a window
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub total: i64,
    pub successful: i64,
    pub avg_duration_ms: i64,
    pub by_scenario: Vec<ScenarioCount>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioCount {
    pub scenario_slug: String,
    pub count: i64,
}

/// Analytics recorder and reporter
pub struct Analytics {
    db: SqlitePool,
}

impl Analytics {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Record one attempt; failures are swallowed after logging
    pub async fn record(&self, event: GenerationEvent<'_>) {
        metrics::GENERATIONS_TOTAL
            .with_label_values(&[
                event.scenario_slug,
                if event.success { "ok" } else { "error" },
            ])
            .inc();
        if event.success && !event.provider.is_empty() {
            metrics::GENERATION_SECONDS
                .with_label_values(&[event.provider])
                .observe(event.duration_ms as f64 / 1000.0);
        }

        let result = sqlx::query(
            "INSERT INTO generation_stats
             (user_id, scenario_slug, tone_style, duration_ms, success, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(event.user_id)
        .bind(event.scenario_slug)
        .bind(event.tone_style)
        .bind(event.duration_ms)
        .bind(event.success)
        .bind(Utc::now())
        .execute(&self.db)
        .await;

        if let Err(e) = result {
            warn!(error = %e, "failed to record generation stats");
        }
    }

    /// Usage summary for one user over the trailing `days`
    pub async fn user_summary(&self, user_id: &str, days: i64) -> ApiResult<UsageSummary> {
        let since = Utc::now() - chrono::Duration::days(days.max(1));

        let row = sqlx::query(
            "SELECT COUNT(*) AS total,
                    COALESCE(SUM(success), 0) AS successful,
                    COALESCE(AVG(CASE WHEN success THEN duration_ms END), 0.0) AS avg_ms
             FROM generation_stats WHERE user_id = ?1 AND created_at >= ?2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.db)
        .await?;

        let total: i64 = row.try_get("total")?;
        let successful: i64 = row.try_get("successful")?;
        let avg_ms: f64 = row.try_get("avg_ms")?;

        let by_scenario = sqlx::query(
            "SELECT scenario_slug, COUNT(*) AS count
             FROM generation_stats WHERE user_id = ?1 AND created_at >= ?2
             GROUP BY scenario_slug ORDER BY count DESC",
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(|row| {
            Ok(ScenarioCount {
                scenario_slug: row.try_get("scenario_slug")?,
                count: row.try_get("count")?,
            })
        })
        .collect::<ApiResult<Vec<_>>>()?;

        Ok(UsageSummary {
            total,
            successful,
            avg_duration_ms: avg_ms as i64,
            by_scenario,
        })
    }
}
