//! Core business logic abstractions

pub mod cache;
pub mod config;
pub mod currency;
pub mod log;

// Re-export main types for cleaner imports
pub use cache::{CacheError, CacheKey, RateCache};
pub use currency::{CurrencyRateProvider, RateDate};
