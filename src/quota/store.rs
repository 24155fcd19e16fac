/// Counter stores backing the time-boxed daily quota pool
///
/// The ledger only needs three operations on a per-user, per-day
/// counter, and all three must be atomic: read, increment-with-ceiling
/// and decrement-with-floor. Redis provides them via small Lua scripts;
/// the in-memory store (cache disabled, tests) provides them under a
/// single mutex.
use crate::cache::{categories, CacheClient};
use crate::error::ApiResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Atomic per-key counter with expiry
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current counter value (0 when absent or expired)
    async fn get(&self, key: &str) -> ApiResult<i64>;

    /// Increment unless the result would exceed `ceiling`; the key
    /// expires `ttl_secs` after its first increment. Returns true when
    /// the increment was kept.
    async fn incr_with_ceiling(&self, key: &str, ceiling: i64, ttl_secs: i64) -> ApiResult<bool>;

    /// Decrement if positive. Returns true when a decrement happened.
    async fn decr_floor(&self, key: &str) -> ApiResult<bool>;
}

/// Redis-backed counter store
pub struct RedisCounterStore {
    cache: CacheClient,
}

impl RedisCounterStore {
    pub fn new(cache: CacheClient) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> ApiResult<i64> {
        self.cache.get_counter(categories::QUOTA, key).await
    }

    async fn incr_with_ceiling(&self, key: &str, ceiling: i64, ttl_secs: i64) -> ApiResult<bool> {
        self.cache
            .incr_with_ceiling(categories::QUOTA, key, ceiling, ttl_secs)
            .await
    }

    async fn decr_floor(&self, key: &str) -> ApiResult<bool> {
        self.cache.decr_floor(categories::QUOTA, key).await
    }
}

/// In-process counter store for cache-disabled deployments and tests
#[derive(Default)]
pub struct MemoryCounterStore {
    entries: Mutex<HashMap<String, CounterEntry>>,
}

struct CounterEntry {
    value: i64,
    expires_at: Instant,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_value(entries: &HashMap<String, CounterEntry>, key: &str) -> i64 {
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => entry.value,
            _ => 0,
        }
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> ApiResult<i64> {
        let entries = self.entries.lock().expect("counter store lock poisoned");
        Ok(Self::live_value(&entries, key))
    }

    async fn incr_with_ceiling(&self, key: &str, ceiling: i64, ttl_secs: i64) -> ApiResult<bool> {
        let mut entries = self.entries.lock().expect("counter store lock poisoned");
        let current = Self::live_value(&entries, key);

        if current + 1 > ceiling {
            return Ok(false);
        }

        let expires_at = match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => entry.expires_at,
            _ => Instant::now() + Duration::from_secs(ttl_secs.max(1) as u64),
        };

        entries.insert(
            key.to_string(),
            CounterEntry {
                value: current + 1,
                expires_at,
            },
        );
        Ok(true)
    }

    async fn decr_floor(&self, key: &str) -> ApiResult<bool> {
        let mut entries = self.entries.lock().expect("counter store lock poisoned");
        let current = Self::live_value(&entries, key);

        if current <= 0 {
            return Ok(false);
        }

        if let Some(entry) = entries.get_mut(key) {
            entry.value = current - 1;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_ceiling() {
        let store = MemoryCounterStore::new();

        assert!(store.incr_with_ceiling("k", 2, 60).await.unwrap());
        assert!(store.incr_with_ceiling("k", 2, 60).await.unwrap());
        assert!(!store.incr_with_ceiling("k", 2, 60).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_memory_store_decr_floor() {
        let store = MemoryCounterStore::new();

        assert!(!store.decr_floor("k").await.unwrap());
        assert!(store.incr_with_ceiling("k", 5, 60).await.unwrap());
        assert!(store.decr_floor("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), 0);
        assert!(!store.decr_floor("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_store_expiry() {
        let store = MemoryCounterStore::new();

        assert!(store.incr_with_ceiling("k", 5, 0).await.unwrap());
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(store.get("k").await.unwrap(), 0);
    }
}
