use crate::core::cache::{CacheError, CacheKey, RateCache, decode_rate, encode_rate};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

struct CacheValue {
    value: String,
    expires_at: Instant,
}

/// In-process rate cache backed by a HashMap
#[derive(Clone, Default)]
pub struct MemoryRateCache {
    inner: Arc<Mutex<HashMap<String, CacheValue>>>,
}

impl MemoryRateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every expired entry, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut cache = self.inner.lock().await;
        let before = cache.len();
        cache.retain(|_, entry| entry.expires_at > now);
        before - cache.len()
    }
}

#[async_trait]
impl RateCache for MemoryRateCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<f64>, CacheError> {
        let mut cache = self.inner.lock().await;
        let Some(entry) = cache.get(key.as_str()) else {
            debug!("Cache MISS for key: {}", key);
            return Ok(None);
        };

        if entry.expires_at <= Instant::now() {
            debug!("Cache entry expired for key: {}", key);
            cache.remove(key.as_str());
            return Ok(None);
        }
        debug!("Cache HIT for key: {}", key);
        decode_rate(key, &entry.value).map(Some)
    }

    async fn put(&self, key: &CacheKey, rate: f64, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or(CacheError::InvalidTtl(ttl))?;
        let cache_value = CacheValue {
            value: encode_rate(rate),
            expires_at,
        };

        let mut cache = self.inner.lock().await;
        debug!("Cache PUT for key: {}", key);
        cache.insert(key.as_str().to_string(), cache_value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::RateDate;
    use tokio::time::sleep;

    fn key(target: &str) -> CacheKey {
        CacheKey::new("usd", target, &RateDate::Today)
    }

    #[tokio::test]
    async fn test_cache_get_put() {
        let cache = MemoryRateCache::new();

        // Initially, cache is empty
        assert!(cache.get(&key("eur")).await.unwrap().is_none());

        cache
            .put(&key("eur"), 1.18, Duration::from_secs(3600))
            .await
            .unwrap();

        assert_eq!(cache.get(&key("eur")).await.unwrap(), Some(1.18));
        assert!(cache.get(&key("inr")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_ttl_expiration() {
        let cache = MemoryRateCache::new();

        // Put value with 10ms TTL
        cache
            .put(&key("eur"), 1.18, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(cache.get(&key("eur")).await.unwrap(), Some(1.18));

        // Wait for TTL expiration
        sleep(Duration::from_millis(20)).await;
        assert!(cache.get(&key("eur")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_put_overwrites() {
        let cache = MemoryRateCache::new();
        let ttl = Duration::from_secs(3600);

        cache.put(&key("eur"), 1.18, ttl).await.unwrap();
        cache.put(&key("eur"), 1.2, ttl).await.unwrap();

        assert_eq!(cache.get(&key("eur")).await.unwrap(), Some(1.2));
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let cache = MemoryRateCache::new();
        let other = cache.clone();

        cache
            .put(&key("eur"), 1.18, Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(other.get(&key("eur")).await.unwrap(), Some(1.18));
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_is_rejected() {
        let cache = MemoryRateCache::new();

        let err = cache
            .put(&key("eur"), 1.18, Duration::MAX)
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidTtl(_)));
        assert!(cache.get(&key("eur")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = MemoryRateCache::new();
        cache
            .put(&key("eur"), 1.18, Duration::from_millis(10))
            .await
            .unwrap();
        cache
            .put(&key("inr"), 83.1, Duration::from_secs(3600))
            .await
            .unwrap();

        sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.inner.lock().await.len(), 1);
        assert_eq!(cache.get(&key("inr")).await.unwrap(), Some(83.1));
    }
}
