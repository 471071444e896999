//! Cache-aside resolution of conversion requests.
//!
//! Each target of a request is looked up in the rate cache first. On a miss
//! the upstream provider is asked for that single pair and the answer is
//! written back before it is used. The response is all-or-nothing: the first
//! target that cannot be resolved fails the whole request.

use crate::core::cache::{CacheError, CacheKey, DEFAULT_TTL, RateCache};
use crate::core::config::{CacheFailurePolicy, ResolutionMode};
use crate::core::currency::{CurrencyRateProvider, RateDate};
use futures::FutureExt;
use futures::stream::{FuturesOrdered, StreamExt};
use serde::{Deserialize, Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversionRequest {
    pub source: Option<String>,
    pub targets: Option<Vec<String>>,
    pub date: Option<String>,
}

/// Target code to rate, kept in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversions(Vec<(String, f64)>);

impl Conversions {
    /// A repeated target keeps its first position and takes the new rate.
    fn insert(&mut self, target: String, rate: f64) {
        match self.0.iter_mut().find(|(existing, _)| *existing == target) {
            Some(entry) => entry.1 = rate,
            None => self.0.push((target, rate)),
        }
    }

    pub fn get(&self, target: &str) -> Option<f64> {
        self.0
            .iter()
            .find(|(existing, _)| existing == target)
            .map(|(_, rate)| *rate)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(target, rate)| (target.as_str(), *rate))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Conversions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(target, rate)| (target, rate)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionResult {
    pub source: String,
    pub conversions: Conversions,
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("'source' and 'targets' (as an array) currencies are required.")]
    InvalidRequest,
    /// The cause is logged where it happens and never carried here.
    #[error("Failed to fetch exchange rate for {target}")]
    TargetResolution { target: String },
    #[error("Rate cache is unavailable")]
    Infrastructure(#[source] CacheError),
}

pub struct ConversionService {
    cache: Arc<dyn RateCache>,
    provider: Arc<dyn CurrencyRateProvider>,
    ttl: Duration,
    on_cache_error: CacheFailurePolicy,
    mode: ResolutionMode,
}

impl ConversionService {
    pub fn new(cache: Arc<dyn RateCache>, provider: Arc<dyn CurrencyRateProvider>) -> Self {
        Self {
            cache,
            provider,
            ttl: DEFAULT_TTL,
            on_cache_error: CacheFailurePolicy::default(),
            mode: ResolutionMode::default(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_cache_failure_policy(mut self, policy: CacheFailurePolicy) -> Self {
        self.on_cache_error = policy;
        self
    }

    pub fn with_mode(mut self, mode: ResolutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub async fn convert(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionResult, ConvertError> {
        let (source, targets) = validate(request)?;
        let source = source.to_lowercase();
        let date = RateDate::resolve(request.date.as_deref());
        debug!(%source, ?targets, %date, "Converting currencies");

        let mut conversions = Conversions::default();
        match self.mode {
            ResolutionMode::Sequential => {
                for target in targets {
                    let rate = self.resolve_target(&source, target, &date).await?;
                    conversions.insert(target.clone(), rate);
                }
            }
            ResolutionMode::Concurrent => {
                let mut pending: FuturesOrdered<_> = targets
                    .iter()
                    .map(|target| {
                        self.resolve_target(&source, target, &date)
                            .map(move |rate| (target, rate))
                    })
                    .collect();
                // Yields in request order; returning early drops the lookups still in flight
                while let Some((target, rate)) = pending.next().await {
                    conversions.insert(target.clone(), rate?);
                }
            }
        }

        info!(%source, count = conversions.len(), "Resolved conversion rates");
        Ok(ConversionResult {
            source,
            conversions,
        })
    }

    async fn resolve_target(
        &self,
        source: &str,
        target: &str,
        date: &RateDate,
    ) -> Result<f64, ConvertError> {
        let target = target.to_lowercase();
        let key = CacheKey::new(source, &target, date);

        match self.cache.get(&key).await {
            Ok(Some(rate)) => {
                debug!(%key, rate, "Cache hit for currency rate");
                return Ok(rate);
            }
            Ok(None) => debug!(%key, "Cache miss for currency rate"),
            // Bad data in a reachable store is replaced by the next write
            Err(e @ CacheError::Malformed { .. }) => {
                warn!(%key, error = %e, "Ignoring unreadable cached rate");
            }
            Err(e) => match self.on_cache_error {
                CacheFailurePolicy::Fail => {
                    error!(%key, error = %e, "Rate cache read failed");
                    return Err(ConvertError::Infrastructure(e));
                }
                CacheFailurePolicy::Miss => {
                    warn!(%key, error = %e, "Rate cache read failed, treating as a miss");
                }
            },
        }

        let rate = self
            .provider
            .get_rate(source, &target, date)
            .await
            .map_err(|e| {
                error!(%key, error = %e, "Upstream rate lookup failed");
                ConvertError::TargetResolution {
                    target: target.clone(),
                }
            })?;

        if let Err(e) = self.cache.put(&key, rate, self.ttl).await {
            match self.on_cache_error {
                CacheFailurePolicy::Miss if matches!(e, CacheError::Unavailable(_)) => {
                    warn!(%key, error = %e, "Rate cache unreachable, rate not stored");
                }
                CacheFailurePolicy::Miss => {
                    error!(%key, error = %e, "Rate cache write failed");
                    return Err(ConvertError::TargetResolution { target });
                }
                CacheFailurePolicy::Fail => {
                    error!(%key, error = %e, "Rate cache write failed");
                    return Err(ConvertError::Infrastructure(e));
                }
            }
        }
        Ok(rate)
    }
}

fn validate(request: &ConversionRequest) -> Result<(&str, &[String]), ConvertError> {
    match (request.source.as_deref(), request.targets.as_deref()) {
        (Some(source), Some(targets)) if !source.is_empty() => Ok((source, targets)),
        _ => Err(ConvertError::InvalidRequest),
    }
}
