/// Redis-based cache and counter layer
///
/// Backs the time-boxed daily quota counters and the read-through
/// catalog caches (scenarios, tone styles). When the cache is disabled
/// the quota ledger falls back to an in-process counter store, so every
/// counter operation here has an in-memory twin in `quota::store`.
use crate::config::CacheConfig;
use crate::error::{ApiError, ApiResult};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info, warn};

/// Redis cache client
#[derive(Clone)]
pub struct CacheClient {
    connection: ConnectionManager,
    config: CacheConfig,
}

impl CacheClient {
    /// Create a new cache client
    pub async fn new(config: CacheConfig) -> ApiResult<Self> {
        if !config.enabled {
            return Err(ApiError::Internal(
                "Cache is disabled, cannot create client".to_string(),
            ));
        }

        info!("Connecting to Redis at {}", config.redis_url);

        let client = Client::open(config.redis_url.as_str()).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            ApiError::Cache(format!("Redis client creation failed: {}", e))
        })?;

        let connection = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to connect to Redis: {}", e);
            ApiError::Cache(format!("Redis connection failed: {}", e))
        })?;

        info!("Redis connection established");

        Ok(Self { connection, config })
    }

    /// Build a cache key with prefix
    fn build_key(&self, category: &str, key: &str) -> String {
        format!("{}{}{}", self.config.key_prefix, category, key)
    }

    /// Get a JSON value from cache
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        category: &str,
        key: &str,
    ) -> ApiResult<Option<T>> {
        let cache_key = self.build_key(category, key);

        let mut conn = self.connection.clone();
        let result: Option<String> = conn.get(&cache_key).await.map_err(|e| {
            warn!("Redis GET failed for {}: {}", cache_key, e);
            ApiError::Cache(format!("Cache get failed: {}", e))
        })?;

        match result {
            Some(json) => match serde_json::from_str(&json) {
                Ok(value) => {
                    debug!("Cache HIT: {}", cache_key);
                    Ok(Some(value))
                }
                Err(e) => {
                    warn!("Failed to deserialize cached value: {}", e);
                    // Delete corrupted cache entry
                    let _ = self.delete(category, key).await;
                    Ok(None)
                }
            },
            None => {
                debug!("Cache MISS: {}", cache_key);
                Ok(None)
            }
        }
    }

    /// Set a JSON value in cache with TTL
    pub async fn set_json<T: Serialize>(
        &self,
        category: &str,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> ApiResult<()> {
        let cache_key = self.build_key(category, key);

        let json = serde_json::to_string(value).map_err(|e| {
            error!("Failed to serialize value for cache: {}", e);
            ApiError::Cache(format!("Cache serialization failed: {}", e))
        })?;

        let mut conn = self.connection.clone();
        let _: () = conn.set_ex(&cache_key, json, ttl_secs).await.map_err(|e| {
            warn!("Redis SET failed for {}: {}", cache_key, e);
            ApiError::Cache(format!("Cache set failed: {}", e))
        })?;

        Ok(())
    }

    /// Delete a value from cache
    pub async fn delete(&self, category: &str, key: &str) -> ApiResult<()> {
        let cache_key = self.build_key(category, key);

        let mut conn = self.connection.clone();
        let _: () = conn.del(&cache_key).await.map_err(|e| {
            warn!("Redis DELETE failed for {}: {}", cache_key, e);
            ApiError::Cache(format!("Cache delete failed: {}", e))
        })?;

        Ok(())
    }

    /// Read a counter value
    pub async fn get_counter(&self, category: &str, key: &str) -> ApiResult<i64> {
        let cache_key = self.build_key(category, key);

        let mut conn = self.connection.clone();
        let value: Option<i64> = conn.get(&cache_key).await.map_err(|e| {
            warn!("Redis GET failed for {}: {}", cache_key, e);
            ApiError::Cache(format!("Counter get failed: {}", e))
        })?;

        Ok(value.unwrap_or(0))
    }

    /// Atomically increment a counter unless the ceiling is reached.
    /// The script increments, sets the TTL on first use, and undoes the
    /// increment when the new value exceeds the ceiling. Returns true
    /// when the increment was kept.
    pub async fn incr_with_ceiling(
        &self,
        category: &str,
        key: &str,
        ceiling: i64,
        ttl_secs: i64,
    ) -> ApiResult<bool> {
        let cache_key = self.build_key(category, key);

        let script = Script::new(
            r#"
            local v = redis.call('INCR', KEYS[1])
            if v == 1 then
                redis.call('EXPIRE', KEYS[1], ARGV[2])
            end
            if v > tonumber(ARGV[1]) then
                redis.call('DECR', KEYS[1])
                return 0
            end
            return 1
            "#,
        );

        let mut conn = self.connection.clone();
        let kept: i64 = script
            .key(&cache_key)
            .arg(ceiling)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                warn!("Redis ceiling INCR failed for {}: {}", cache_key, e);
                ApiError::Cache(format!("Counter increment failed: {}", e))
            })?;

        Ok(kept == 1)
    }

    /// Decrement a counter if it is positive. Returns true when a
    /// decrement happened.
    pub async fn decr_floor(&self, category: &str, key: &str) -> ApiResult<bool> {
        let cache_key = self.build_key(category, key);

        let script = Script::new(
            r#"
            local v = tonumber(redis.call('GET', KEYS[1]) or '0')
            if v > 0 then
                redis.call('DECR', KEYS[1])
                return 1
            end
            return 0
            "#,
        );

        let mut conn = self.connection.clone();
        let decremented: i64 = script
            .key(&cache_key)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                warn!("Redis floor DECR failed for {}: {}", cache_key, e);
                ApiError::Cache(format!("Counter decrement failed: {}", e))
            })?;

        Ok(decremented == 1)
    }

    /// Ping Redis to check connection
    pub async fn ping(&self) -> ApiResult<()> {
        let mut conn = self.connection.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Redis PING failed: {}", e);
                ApiError::Cache(format!("Cache ping failed: {}", e))
            })?;

        if pong != "PONG" {
            return Err(ApiError::Cache("Unexpected Redis PING response".to_string()));
        }

        Ok(())
    }
}

/// Cache category constants
pub mod categories {
    pub const QUOTA: &str = "quota:";
    pub const SCENARIO: &str = "scenario:";
    pub const TONE_STYLE: &str = "tone:";
}
