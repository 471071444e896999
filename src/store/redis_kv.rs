use crate::core::cache::{CacheError, CacheKey, RateCache, decode_rate, encode_rate};
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::{AsyncCommands, RedisError, aio::ConnectionLike, aio::ConnectionManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Rate cache in a shared redis instance, using `GET` and `SETEX`.
///
/// The connection is established in the background. Until it is up, and
/// whenever the manager is reconnecting afterwards, commands fail with
/// `CacheError::Unavailable`.
pub struct RedisRateCache<C = ConnectionManager> {
    conn: Arc<OnceCell<C>>,
}

impl<C> Clone for RedisRateCache<C> {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

impl RedisRateCache<ConnectionManager> {
    /// Validates `url` and starts connecting without waiting for the server.
    pub fn open(url: &str) -> Result<Self> {
        let client =
            redis::Client::open(url).with_context(|| format!("Invalid redis url: {url}"))?;
        let cache = Self {
            conn: Arc::new(OnceCell::new()),
        };

        let cell = cache.conn.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            loop {
                match ConnectionManager::new(client.clone()).await {
                    Ok(manager) => {
                        let _ = cell.set(manager);
                        info!("Connected to redis at {}", url);
                        break;
                    }
                    Err(e) => {
                        error!(%url, error = %e, "Failed to connect to redis, retrying");
                        tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                    }
                }
            }
        });
        Ok(cache)
    }
}

impl<C> RedisRateCache<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    /// Wraps an already established connection.
    pub fn with_connection(conn: C) -> Self {
        Self {
            conn: Arc::new(OnceCell::new_with(Some(conn))),
        }
    }

    fn connection(&self) -> Result<C, CacheError> {
        self.conn
            .get()
            .cloned()
            .ok_or_else(|| CacheError::Unavailable("redis is not connected".to_string()))
    }
}

fn unavailable(e: RedisError) -> CacheError {
    CacheError::Unavailable(e.to_string())
}

#[async_trait]
impl<C> RateCache for RedisRateCache<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &CacheKey) -> Result<Option<f64>, CacheError> {
        let mut conn = self.connection()?;
        let value: Option<String> = conn.get(key.as_str()).await.map_err(unavailable)?;
        match value {
            Some(text) => {
                debug!("Cache HIT for key: {}", key);
                decode_rate(key, &text).map(Some)
            }
            None => {
                debug!("Cache MISS for key: {}", key);
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &CacheKey, rate: f64, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection()?;
        // SETEX rejects a zero expiry
        let seconds = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(key.as_str(), encode_rate(rate), seconds)
            .await
            .map_err(unavailable)?;
        debug!("Cache PUT for key: {}", key);
        Ok(())
    }
}
