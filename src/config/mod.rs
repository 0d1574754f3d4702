use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use url::Url;

pub mod defaults;
pub mod duration_serde;

use crate::errors::{CacheError, CacheResult};
use defaults::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Raise the default log filter to debug for this crate
    #[serde(default = "default_debug_logging")]
    pub debug_logging: bool,
    pub unsplash: UnsplashConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Remote catalog settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsplashConfig {
    pub client_id: String,
    /// Collection filters, comma-joined into the request when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_request_timeout", with = "duration_serde::duration")]
    pub request_timeout: Duration,
    #[serde(default = "default_connect_timeout", with = "duration_serde::duration")]
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding one blob file per record id
    #[serde(default = "default_cache_root")]
    pub root: PathBuf,
    /// Refill is skipped once this many downloaded-unseen records exist
    #[serde(default = "default_target_unused_count")]
    pub target_unused_count: usize,
    /// Batch size requested when the caller does not pass one
    #[serde(default = "default_image_count")]
    pub default_image_count: usize,
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_request_timeout() -> Duration {
    humantime::parse_duration(DEFAULT_REQUEST_TIMEOUT).unwrap_or(Duration::from_secs(30))
}

fn default_connect_timeout() -> Duration {
    humantime::parse_duration(DEFAULT_CONNECT_TIMEOUT).unwrap_or(Duration::from_secs(10))
}

fn default_cache_root() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_ROOT)
}

fn default_target_unused_count() -> usize {
    DEFAULT_TARGET_UNUSED_COUNT
}

fn default_image_count() -> usize {
    DEFAULT_IMAGE_COUNT
}

fn default_max_concurrent_downloads() -> usize {
    DEFAULT_MAX_CONCURRENT_DOWNLOADS
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_debug_logging() -> bool {
    DEFAULT_DEBUG_LOGGING
}

impl Default for UnsplashConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            collections: None,
            endpoint: default_endpoint(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: default_cache_root(),
            target_unused_count: default_target_unused_count(),
            default_image_count: default_image_count(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            unsplash: UnsplashConfig::default(),
            cache: CacheConfig::default(),
            database: DatabaseConfig::default(),
            debug_logging: default_debug_logging(),
        }
    }
}

impl Config {
    /// Build a minimal configuration for a client id, everything else defaulted
    pub fn with_client_id<S: Into<String>>(client_id: S) -> Self {
        let mut config = Self::default();
        config.unsplash.client_id = client_id.into();
        config
    }

    /// Layered sources: defaults, then the TOML file, then `UNSPLASH_CACHE_*` env vars
    pub fn figment(config_file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate configuration, writing a default file when none exists
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        let path = Path::new(config_file);
        if !path.exists() {
            let contents = toml::to_string_pretty(&Self::default())?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, contents)?;
            info!("Created default config file: {}", config_file);
        }

        let config: Self = Self::figment(path)
            .extract()
            .with_context(|| format!("Failed to read configuration from {config_file}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CacheResult<()> {
        if self.unsplash.client_id.trim().is_empty() {
            return Err(CacheError::configuration(
                "unsplash.client_id must be set (or UNSPLASH_CACHE_UNSPLASH__CLIENT_ID)",
            ));
        }

        Url::parse(&self.unsplash.endpoint).map_err(|e| {
            CacheError::configuration(format!(
                "unsplash.endpoint '{}' is not a valid URL: {e}",
                self.unsplash.endpoint
            ))
        })?;

        if let Some(collections) = &self.unsplash.collections
            && collections.iter().any(|c| c.trim().is_empty())
        {
            return Err(CacheError::configuration(
                "unsplash.collections must not contain empty entries",
            ));
        }

        if !(1..=MAX_BATCH_COUNT).contains(&self.cache.default_image_count) {
            return Err(CacheError::configuration(format!(
                "cache.default_image_count must be between 1 and {MAX_BATCH_COUNT}, got {}",
                self.cache.default_image_count
            )));
        }

        if self.cache.max_concurrent_downloads == 0 {
            return Err(CacheError::configuration(
                "cache.max_concurrent_downloads must be at least 1",
            ));
        }

        Ok(())
    }
}
