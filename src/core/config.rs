use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

/// Written by `ratecache setup`.
pub const DEFAULT_CONFIG: &str = r#"---
server:
  listen_addr: "0.0.0.0:3000"

upstream:
  base_url: "https://api.apyhub.com"
  # api_key: "<your apy-token>"   # or set APY_API_KEY
  timeout_secs: 30

cache:
  backend: redis   # memory | disk | redis
  redis_url: "redis://localhost:6379"
  ttl_secs: 3600
  on_error: miss   # miss | fail

convert:
  mode: sequential # sequential | concurrent
"#;

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 3000)),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        UpstreamConfig {
            base_url: "https://api.apyhub.com".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Disk,
    Redis,
}

/// What a request does when the cache backend fails.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheFailurePolicy {
    /// Read failures fall through to the upstream provider.
    #[default]
    Miss,
    /// Any backend failure aborts the request.
    Fail,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub redis_url: String,
    pub data_path: Option<String>,
    pub ttl_secs: u64,
    pub on_error: CacheFailurePolicy,
}

/// Longest rate expiry accepted from configuration, one year.
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("dev", "ratecache", "ratecache")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().join("cache"))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            backend: CacheBackend::Redis,
            redis_url: "redis://localhost:6379".to_string(),
            data_path: None,
            ttl_secs: 3600,
            on_error: CacheFailurePolicy::Miss,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    #[default]
    Sequential,
    Concurrent,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct ConvertConfig {
    pub mode: ResolutionMode,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub convert: ConvertConfig,
}

impl AppConfig {
    /// Loads the default config file, falling back to defaults when none exists.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "ratecache", "ratecache")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_TTL_SECS).contains(&self.cache.ttl_secs) {
            anyhow::bail!(
                "cache.ttl_secs must be between 1 and {}, got {}",
                MAX_TTL_SECS,
                self.cache.ttl_secs
            );
        }
        Ok(())
    }

    /// Applies `PORT`, `APY_API_KEY` and `REDIS_URL` from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            let port: u16 = port
                .parse()
                .with_context(|| format!("Invalid PORT value: {port}"))?;
            self.server.listen_addr.set_port(port);
        }
        if let Some(api_key) = lookup("APY_API_KEY") {
            self.upstream.api_key = Some(api_key);
        }
        if let Some(redis_url) = lookup("REDIS_URL") {
            self.cache.backend = CacheBackend::Redis;
            self.cache.redis_url = redis_url;
        }
        Ok(self)
    }
}
