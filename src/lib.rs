pub mod api;
pub mod convert;
pub mod core;
pub mod providers;
pub mod store;

pub use crate::core::config;

use crate::api::{AppState, app_router};
use crate::config::AppConfig;
use crate::convert::ConversionService;
use crate::providers::ApyHubProvider;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Wires the rate cache, the upstream provider and the orchestrator together.
pub async fn build_state(config: &AppConfig) -> Result<Arc<AppState>> {
    config.validate()?;
    let cache = store::open_rate_cache(&config.cache).await?;

    if config.upstream.api_key.is_none() {
        warn!("No upstream API key configured, requests will be sent without one");
    }
    let provider = ApyHubProvider::new(
        &config.upstream.base_url,
        config.upstream.api_key.as_deref(),
        config.upstream.timeout(),
    )
    .context("Failed to build upstream HTTP client")?;

    let converter = ConversionService::new(cache, Arc::new(provider))
        .with_ttl(config.cache.ttl())
        .with_cache_failure_policy(config.cache.on_error)
        .with_mode(config.convert.mode);
    Ok(Arc::new(AppState { converter }))
}

pub async fn serve(config: AppConfig) -> Result<()> {
    let state = build_state(&config).await?;
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen_addr))?;
    info!("Server is running on {}", config.server.listen_addr);
    axum::serve(listener, router).await?;
    Ok(())
}

pub async fn run(config_path: Option<&str>) -> Result<()> {
    info!("Rate cache gateway starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    }
    .with_env_overrides()?;
    debug!(
        listen_addr = %config.server.listen_addr,
        upstream = %config.upstream.base_url,
        backend = ?config.cache.backend,
        mode = ?config.convert.mode,
        "Loaded config"
    );

    serve(config).await
}
