use crate::core::cache::{CacheError, CacheKey, RateCache, decode_rate, encode_rate};
use anyhow::{Context, Result};
use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::debug;

const RATES_PARTITION: &str = "rates";

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    value: String,
    expires_at: SystemTime,
}

/// Rate cache persisted in a fjall keyspace, surviving restarts.
pub struct DiskRateCache {
    _keyspace: Keyspace,
    partition: PartitionHandle,
}

impl DiskRateCache {
    pub fn open(db_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(db_path)
            .with_context(|| format!("Failed to create directory: {}", db_path.display()))?;

        let keyspace = Config::new(db_path)
            .open()
            .with_context(|| format!("Failed to open rate cache at {}", db_path.display()))?;
        let partition = keyspace
            .open_partition(RATES_PARTITION, PartitionCreateOptions::default())
            .context("Failed to open rates partition")?;
        debug!("Opened disk rate cache at {}", db_path.display());
        Ok(Self {
            _keyspace: keyspace,
            partition,
        })
    }

    /// Deletes every expired entry, returning how many were removed.
    /// Entries that cannot be decoded are left for `put` to overwrite.
    pub async fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = SystemTime::now();
        let mut expired = Vec::new();
        for item in self.partition.iter() {
            let (key, bytes) = item.map_err(unavailable)?;
            if let Ok(entry) = serde_json::from_slice::<CacheEntry>(&bytes) {
                if entry.expires_at <= now {
                    expired.push(key);
                }
            }
        }

        let count = expired.len();
        for key in expired {
            self.partition.remove(key).map_err(unavailable)?;
        }
        Ok(count)
    }
}

fn unavailable(e: fjall::Error) -> CacheError {
    CacheError::Unavailable(e.to_string())
}

#[async_trait]
impl RateCache for DiskRateCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<f64>, CacheError> {
        let Some(bytes) = self.partition.get(key.as_str()).map_err(unavailable)? else {
            debug!("Cache MISS for key: {}", key);
            return Ok(None);
        };

        let entry: CacheEntry =
            serde_json::from_slice(&bytes).map_err(|_| CacheError::Malformed {
                key: key.to_string(),
                value: String::from_utf8_lossy(&bytes).into_owned(),
            })?;
        if SystemTime::now() >= entry.expires_at {
            debug!("Cache entry expired for key: {}", key);
            self.partition.remove(key.as_str()).map_err(unavailable)?;
            return Ok(None);
        }
        debug!("Cache HIT for key: {}", key);
        decode_rate(key, &entry.value).map(Some)
    }

    async fn put(&self, key: &CacheKey, rate: f64, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = SystemTime::now()
            .checked_add(ttl)
            .ok_or(CacheError::InvalidTtl(ttl))?;
        let entry = CacheEntry {
            value: encode_rate(rate),
            expires_at,
        };
        let bytes = serde_json::to_vec(&entry).map_err(|e| CacheError::Malformed {
            key: key.to_string(),
            value: e.to_string(),
        })?;
        self.partition
            .insert(key.as_str(), bytes)
            .map_err(unavailable)?;
        debug!("Cache PUT for key: {}", key);
        Ok(())
    }
}
