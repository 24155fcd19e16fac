/// Scenario and tone-style catalog
///
/// Scenarios declare a system prompt, an input schema and a length
/// cap; tone styles carry a prompt modifier. Both change rarely, so
/// reads go through the cache when one is configured and writes
/// invalidate it.
use crate::cache::{categories, CacheClient};
use crate::db::models::{InputSchema, Scenario, ToneStyle};
use crate::error::{ApiError, ApiResult};
use sqlx::SqlitePool;
use tracing::debug;

const LIST_KEY: &str = "all";

/// Catalog of scenarios and tone styles
pub struct ScenarioCatalog {
    db: SqlitePool,
    cache: Option<CacheClient>,
    cache_ttl: u64,
}

impl ScenarioCatalog {
    pub fn new(db: SqlitePool, cache: Option<CacheClient>, cache_ttl: u64) -> Self {
        Self {
            db,
            cache,
            cache_ttl,
        }
    }

    pub async fn list_scenarios(&self) -> ApiResult<Vec<Scenario>> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache
                .get_json::<Vec<Scenario>>(categories::SCENARIO, LIST_KEY)
                .await?
            {
                return Ok(cached);
            }
        }

        let scenarios =
            sqlx::query_as::<_, Scenario>("SELECT * FROM scenarios ORDER BY created_at")
                .fetch_all(&self.db)
                .await?;

        if let Some(cache) = &self.cache {
            cache
                .set_json(categories::SCENARIO, LIST_KEY, &scenarios, self.cache_ttl)
                .await?;
        }

        Ok(scenarios)
    }

    pub async fn get_scenario(&self, id_or_slug: &str) -> ApiResult<Scenario> {
        let scenario = sqlx::query_as::<_, Scenario>(
            "SELECT * FROM scenarios WHERE id = ?1 OR slug = ?1",
        )
        .bind(id_or_slug)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Scenario {} not found", id_or_slug)))?;

        Ok(scenario)
    }

    pub async fn list_tone_styles(&self) -> ApiResult<Vec<ToneStyle>> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache
                .get_json::<Vec<ToneStyle>>(categories::TONE_STYLE, LIST_KEY)
                .await?
            {
                return Ok(cached);
            }
        }

        let styles = sqlx::query_as::<_, ToneStyle>("SELECT * FROM tone_styles ORDER BY slug")
            .fetch_all(&self.db)
            .await?;

        if let Some(cache) = &self.cache {
            cache
                .set_json(categories::TONE_STYLE, LIST_KEY, &styles, self.cache_ttl)
                .await?;
        }

        Ok(styles)
    }

    pub async fn get_tone_style(&self, slug: &str) -> ApiResult<Option<ToneStyle>> {
        let style = sqlx::query_as::<_, ToneStyle>(
            "SELECT * FROM tone_styles WHERE id = ?1 OR slug = ?1",
        )
        .bind(slug)
        .fetch_optional(&self.db)
        .await?;

        Ok(style)
    }

    /// Parse a scenario's declared input schema
    pub fn input_schema(scenario: &Scenario) -> ApiResult<InputSchema> {
        serde_json::from_str(&scenario.input_schema).map_err(|e| {
            debug!(scenario = %scenario.slug, error = %e, "invalid input schema");
            ApiError::Internal(format!(
                "Scenario {} has an invalid input schema",
                scenario.slug
            ))
        })
    }

    /// Drop cached lists after a catalog write
    pub async fn invalidate_cache(&self) -> ApiResult<()> {
        if let Some(cache) = &self.cache {
            cache.delete(categories::SCENARIO, LIST_KEY).await?;
            cache.delete(categories::TONE_STYLE, LIST_KEY).await?;
        }
        Ok(())
    }
}
