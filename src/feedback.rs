/// User feedback
use crate::db::models::FeedbackEntry;
use crate::error::{ApiError, ApiResult};
use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

const MAX_CONTENT_LEN: usize = 2000;
const CATEGORIES: &[&str] = &["bug", "feature", "content", "other"];

/// A feedback submission
#[derive(Debug, Deserialize)]
pub struct FeedbackSubmission {
    pub category: String,
    pub content: String,
    #[serde(default)]
    pub contact: Option<String>,
}

/// Feedback store
pub struct FeedbackService {
    db: SqlitePool,
}

impl FeedbackService {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn submit(
        &self,
        user_id: &str,
        submission: FeedbackSubmission,
    ) -> ApiResult<FeedbackEntry> {
        if submission.content.trim().is_empty() {
            return Err(ApiError::Validation(
                "Feedback content cannot be empty".to_string(),
            ));
        }
        if submission.content.chars().count() > MAX_CONTENT_LEN {
            return Err(ApiError::Validation(format!(
                "Feedback content exceeds {} characters",
                MAX_CONTENT_LEN
            )));
        }

        let category = submission.category.to_lowercase();
        if !CATEGORIES.contains(&category.as_str()) {
            return Err(ApiError::Validation(format!(
                "Unknown feedback category: {}",
                submission.category
            )));
        }

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO feedback (id, user_id, category, content, contact, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(&category)
        .bind(submission.content.trim())
        .bind(submission.contact.as_deref())
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        info!(user_id, category, "feedback submitted");

        let entry = sqlx::query_as::<_, FeedbackEntry>("SELECT * FROM feedback WHERE id = ?1")
            .bind(&id)
            .fetch_one(&self.db)
            .await?;
        Ok(entry)
    }

    pub async fn list_for_user(&self, user_id: &str) -> ApiResult<Vec<FeedbackEntry>> {
        let entries = sqlx::query_as::<_, FeedbackEntry>(
            "SELECT * FROM feedback WHERE user_id = ?1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(entries)
    }
}
