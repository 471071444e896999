pub mod disk;
pub mod memory;
pub mod redis_kv;

use crate::core::cache::{CacheError, RateCache};
use crate::core::config::{CacheBackend, CacheConfig};
use anyhow::Result;
use async_trait::async_trait;
use disk::DiskRateCache;
use memory::MemoryRateCache;
use redis_kv::RedisRateCache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Opens the rate cache backend selected in the configuration.
///
/// Redis expires keys itself. The in-process backends get a background task
/// that drops expired entries nobody reads again.
pub async fn open_rate_cache(config: &CacheConfig) -> Result<Arc<dyn RateCache>> {
    info!(backend = ?config.backend, "Opening rate cache");
    let cache: Arc<dyn RateCache> = match config.backend {
        CacheBackend::Memory => {
            let cache = Arc::new(MemoryRateCache::new());
            spawn_sweeper(&cache, SWEEP_INTERVAL);
            cache
        }
        CacheBackend::Disk => {
            let cache = Arc::new(DiskRateCache::open(&config.data_path()?)?);
            spawn_sweeper(&cache, SWEEP_INTERVAL);
            cache
        }
        CacheBackend::Redis => Arc::new(RedisRateCache::open(&config.redis_url)?),
    };
    Ok(cache)
}

#[async_trait]
trait ExpirySweep: Send + Sync + 'static {
    async fn sweep(&self) -> Result<usize, CacheError>;
}

#[async_trait]
impl ExpirySweep for MemoryRateCache {
    async fn sweep(&self) -> Result<usize, CacheError> {
        Ok(self.purge_expired().await)
    }
}

#[async_trait]
impl ExpirySweep for DiskRateCache {
    async fn sweep(&self) -> Result<usize, CacheError> {
        self.purge_expired().await
    }
}

/// Sweeps `cache` every `period` until the last strong reference is gone.
fn spawn_sweeper<T: ExpirySweep>(cache: &Arc<T>, period: Duration) {
    let weak = Arc::downgrade(cache);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(cache) = weak.upgrade() else {
                break;
            };
            match cache.sweep().await {
                Ok(0) => {}
                Ok(purged) => debug!(purged, "Swept expired rate cache entries"),
                Err(e) => warn!(error = %e, "Failed to sweep rate cache"),
            }
        }
    });
}
