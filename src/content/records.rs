/// Generated-content persistence
use crate::db::models::ContentRecord;
use crate::error::{ApiError, ApiResult};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Content record store
pub struct ContentRecordStore {
    db: SqlitePool,
}

/// Fields for a new record
pub struct NewRecord<'a> {
    pub user_id: &'a str,
    pub scenario_id: &'a str,
    pub tone_style: &'a str,
    pub user_input: &'a str,
    pub generated_content: &'a str,
    pub generation_ms: i64,
    pub model: &'a str,
    pub provider: &'a str,
}

impl ContentRecordStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn create(&self, record: NewRecord<'_>) -> ApiResult<ContentRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO content_records
             (id, user_id, scenario_id, tone_style, user_input, generated_content,
              generation_ms, model, provider, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&id)
        .bind(record.user_id)
        .bind(record.scenario_id)
        .bind(record.tone_style)
        .bind(record.user_input)
        .bind(record.generated_content)
        .bind(record.generation_ms)
        .bind(record.model)
        .bind(record.provider)
        .bind(now)
        .execute(&self.db)
        .await?;

        self.get(&id, record.user_id).await
    }

    /// Fetch one record, enforcing ownership
    pub async fn get(&self, id: &str, user_id: &str) -> ApiResult<ContentRecord> {
        let record =
            sqlx::query_as::<_, ContentRecord>("SELECT * FROM content_records WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.db)
                .await?
                .ok_or_else(|| ApiError::NotFound("Content record not found".to_string()))?;

        if record.user_id != user_id {
            return Err(ApiError::Forbidden("Not your content".to_string()));
        }
        Ok(record)
    }

    /// Page a user's records, newest first, optionally by scenario
    pub async fn page(
        &self,
        user_id: &str,
        scenario_id: Option<&str>,
        page: i64,
        page_size: i64,
    ) -> ApiResult<(Vec<ContentRecord>, i64)> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let offset = (page - 1) * page_size;

        let (records, total) = match scenario_id {
            Some(scenario_id) => {
                let records = sqlx::query_as::<_, ContentRecord>(
                    "SELECT * FROM content_records
                     WHERE user_id = ?1 AND scenario_id = ?2
                     ORDER BY created_at DESC LIMIT ?3 OFFSET ?4",
                )
                .bind(user_id)
                .bind(scenario_id)
                .bind(page_size)
                .bind(offset)
                .fetch_all(&self.db)
                .await?;

                let total: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM content_records WHERE user_id = ?1 AND scenario_id = ?2",
                )
                .bind(user_id)
                .bind(scenario_id)
                .fetch_one(&self.db)
                .await?;

                (records, total)
            }
            None => {
                let records = sqlx::query_as::<_, ContentRecord>(
                    "SELECT * FROM content_records WHERE user_id = ?1
                     ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
                )
                .bind(user_id)
                .bind(page_size)
                .bind(offset)
                .fetch_all(&self.db)
                .await?;

                let total: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM content_records WHERE user_id = ?1")
                        .bind(user_id)
                        .fetch_one(&self.db)
                        .await?;

                (records, total)
            }
        };

        Ok((records, total))
    }

    /// Store the user's edited version alongside the original
    pub async fn update_edited(
        &self,
        id: &str,
        user_id: &str,
        edited_content: &str,
    ) -> ApiResult<ContentRecord> {
        // Ownership check first so a foreign id 403s instead of 404ing
        self.get(id, user_id).await?;

        sqlx::query("UPDATE content_records SET edited_content = ?1 WHERE id = ?2")
            .bind(edited_content)
            .bind(id)
            .execute(&self.db)
            .await?;

        self.get(id, user_id).await
    }

    pub async fn delete(&self, id: &str, user_id: &str) -> ApiResult<()> {
        self.get(id, user_id).await?;

        sqlx::query("DELETE FROM content_records WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
