//! Currency conversion abstractions

use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Display;

/// The day a rate is requested for.
///
/// An absent or empty date means the provider's current rate. It renders as
/// `today` so it can take part in cache keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum RateDate {
    #[default]
    Today,
    On(String),
}

impl RateDate {
    pub fn resolve(date: Option<&str>) -> Self {
        match date {
            None | Some("") => RateDate::Today,
            Some(day) => RateDate::On(day.to_string()),
        }
    }

    /// Date to forward upstream, `None` for the current rate.
    pub fn as_param(&self) -> Option<&str> {
        match self {
            RateDate::Today => None,
            RateDate::On(day) => Some(day),
        }
    }
}

impl Display for RateDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateDate::Today => write!(f, "today"),
            RateDate::On(day) => write!(f, "{day}"),
        }
    }
}

#[async_trait]
pub trait CurrencyRateProvider: Send + Sync {
    async fn get_rate(&self, source: &str, target: &str, date: &RateDate) -> Result<f64>;
}
