//! Rate cache abstractions shared by all storage backends

use crate::core::currency::RateDate;
use async_trait::async_trait;
use std::fmt::Display;
use std::time::Duration;
use thiserror::Error;

/// Lifetime of a cached rate.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Key of a cached rate, `source:target:date` with both codes lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(source: &str, target: &str, date: &RateDate) -> Self {
        CacheKey(format!(
            "{}:{}:{}",
            source.to_lowercase(),
            target.to_lowercase(),
            date
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cached value for {key} is not a rate: {value:?}")]
    Malformed { key: String, value: String },
    #[error("expiry of {0:?} is out of range")]
    InvalidTtl(Duration),
}

/// Expiring store of previously resolved rates.
///
/// A missing or expired key is `Ok(None)`. `Err` is reserved for a backend
/// that could not be read or written.
#[async_trait]
pub trait RateCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<f64>, CacheError>;

    /// Stores `rate` under `key`, replacing any previous value.
    async fn put(&self, key: &CacheKey, rate: f64, ttl: Duration) -> Result<(), CacheError>;
}

/// Text form of a rate as kept by the backends.
pub fn encode_rate(rate: f64) -> String {
    rate.to_string()
}

pub fn decode_rate(key: &CacheKey, text: &str) -> Result<f64, CacheError> {
    match text.trim().parse::<f64>() {
        Ok(rate) if rate.is_finite() => Ok(rate),
        _ => Err(CacheError::Malformed {
            key: key.to_string(),
            value: text.to_string(),
        }),
    }
}
