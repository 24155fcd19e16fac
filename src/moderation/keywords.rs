/// Keyword set persistence and hot reload
///
/// Keywords live in the `sensitive_words` table; a single version row
/// in `keyword_meta` is bumped on every mutation. Each index holds a
/// compiled `WordFilter` behind a swap lock and rebuilds it when its
/// loaded version falls behind the stored one, so multiple processes
/// converge without coordinating.
use crate::error::{ApiError, ApiResult};
use crate::moderation::filter::WordFilter;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::info;

/// SQLite-backed keyword index with an in-memory compiled matcher
pub struct KeywordIndex {
    db: SqlitePool,
    automaton: RwLock<Arc<WordFilter>>,
    loaded_version: AtomicI64,
}

impl KeywordIndex {
    /// Create the index and compile the current keyword set
    pub async fn load(db: SqlitePool) -> ApiResult<Self> {
        let index = Self {
            db,
            automaton: RwLock::new(Arc::new(WordFilter::empty())),
            loaded_version: AtomicI64::new(-1),
        };
        index.reload().await?;
        Ok(index)
    }

    /// The currently compiled matcher
    pub fn current(&self) -> Arc<WordFilter> {
        self.automaton
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub async fn count(&self) -> ApiResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sensitive_words")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    pub async fn contains(&self, word: &str) -> ApiResult<bool> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT word FROM sensitive_words WHERE word = ?1")
                .bind(normalize(word))
                .fetch_optional(&self.db)
                .await?;
        Ok(found.is_some())
    }

    pub async fn list(&self) -> ApiResult<Vec<String>> {
        let words: Vec<String> =
            sqlx::query_scalar("SELECT word FROM sensitive_words ORDER BY word")
                .fetch_all(&self.db)
                .await?;
        Ok(words)
    }

    /// Add one keyword; no-op when already present
    pub async fn add(&self, word: &str) -> ApiResult<bool> {
        let word = normalize(word);
        if word.is_empty() {
            return Err(ApiError::Validation("Keyword cannot be empty".to_string()));
        }

        let result = sqlx::query("INSERT OR IGNORE INTO sensitive_words (word) VALUES (?1)")
            .bind(&word)
            .execute(&self.db)
            .await?;

        let added = result.rows_affected() == 1;
        if added {
            self.bump_version().await?;
            self.reload().await?;
        }
        Ok(added)
    }

    /// Remove one keyword
    pub async fn remove(&self, word: &str) -> ApiResult<bool> {
        let result = sqlx::query("DELETE FROM sensitive_words WHERE word = ?1")
            .bind(normalize(word))
            .execute(&self.db)
            .await?;

        let removed = result.rows_affected() == 1;
        if removed {
            self.bump_version().await?;
            self.reload().await?;
        }
        Ok(removed)
    }

    /// Bulk import; returns the number of new keywords
    pub async fn import(&self, words: &[String]) -> ApiResult<u64> {
        let mut added = 0u64;
        for word in words {
            let word = normalize(word);
            if word.is_empty() {
                continue;
            }
            let result = sqlx::query("INSERT OR IGNORE INTO sensitive_words (word) VALUES (?1)")
                .bind(&word)
                .execute(&self.db)
                .await?;
            added += result.rows_affected();
        }

        if added > 0 {
            self.bump_version().await?;
            self.reload().await?;
        }

        info!(imported = added, "keyword import finished");
        Ok(added)
    }

    /// Stored keyword-set version
    pub async fn stored_version(&self) -> ApiResult<i64> {
        let version: i64 = sqlx::query_scalar("SELECT version FROM keyword_meta WHERE id = 1")
            .fetch_one(&self.db)
            .await?;
        Ok(version)
    }

    /// Version the compiled matcher was built from
    pub fn loaded_version(&self) -> i64 {
        self.loaded_version.load(Ordering::Acquire)
    }

    /// Recompile when the stored version has moved past the loaded one;
    /// background job entry point
    pub async fn sync_if_stale(&self) -> ApiResult<bool> {
        let stored = self.stored_version().await?;
        if stored == self.loaded_version() {
            return Ok(false);
        }
        self.reload().await?;
        Ok(true)
    }

    async fn reload(&self) -> ApiResult<()> {
        let stored = self.stored_version().await?;
        let words = self.list().await?;
        let filter = Arc::new(WordFilter::new(words.iter().map(String::as_str)));

        {
            let mut guard = self.automaton.write().unwrap_or_else(|e| e.into_inner());
            *guard = filter;
        }
        self.loaded_version.store(stored, Ordering::Release);

        info!(words = words.len(), version = stored, "keyword matcher compiled");
        Ok(())
    }

    async fn bump_version(&self) -> ApiResult<()> {
        sqlx::query("UPDATE keyword_meta SET version = version + 1 WHERE id = 1")
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

fn normalize(word: &str) -> String {
    word.trim().to_lowercase()
}
