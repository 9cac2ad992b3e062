//! Configuration management for devstrap
//!
//! This module provides unified configuration management with zero-config
//! defaults and a single optional TOML file covering every subsystem. Raw
//! TOML sections use plain integers for durations and convert into the
//! richer per-module configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::cache::CacheConfig;
use crate::app::client::{ClientConfig, RetryConfig};
use crate::app::mirrors::MirrorMap;
use crate::app::orchestrator::OrchestratorConfig;
use crate::constants::{http, limits, workers};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Download cache settings
    #[serde(default)]
    pub cache: CacheConfigToml,
    /// HTTP client settings
    #[serde(default)]
    pub client: ClientConfigToml,
    /// Retry policy settings
    #[serde(default)]
    pub retry: RetryConfigToml,
    /// Orchestrator settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfigToml,
    /// Mirror host substitution map
    #[serde(default)]
    pub mirrors: MirrorMap,
    /// Installer state directory (ledgers); OS-specific if None
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// TOML-friendly cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfigToml {
    /// Cache directory path (OS-specific if None)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_root: Option<PathBuf>,
    /// Maximum entry age before eviction, in hours
    pub max_age_hours: u64,
    /// Aggregate size budget in bytes (0 = unlimited)
    pub max_total_bytes: u64,
}

impl Default for CacheConfigToml {
    fn default() -> Self {
        let defaults = CacheConfig::default();
        Self {
            cache_root: None,
            max_age_hours: defaults.max_age_hours,
            max_total_bytes: defaults.max_total_bytes,
        }
    }
}

/// TOML-friendly client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfigToml {
    /// Request timeout in seconds (bounds one download attempt)
    pub request_timeout_secs: u64,
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Maximum connections per host
    pub pool_max_per_host: usize,
    /// Rate limit (requests per second)
    pub rate_limit_rps: u32,
}

impl Default for ClientConfigToml {
    fn default() -> Self {
        Self {
            request_timeout_secs: http::DEFAULT_TIMEOUT.as_secs(),
            connect_timeout_secs: http::CONNECT_TIMEOUT.as_secs(),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
        }
    }
}

/// TOML-friendly retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfigToml {
    /// Attempt budget per candidate URL
    pub max_attempts: u32,
    /// Initial backoff delay in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum backoff delay in seconds
    pub max_delay_secs: u64,
    /// Backoff multiplier
    pub multiplier: f64,
}

impl Default for RetryConfigToml {
    fn default() -> Self {
        Self {
            max_attempts: limits::MAX_ATTEMPTS,
            initial_delay_ms: limits::RETRY_INITIAL_DELAY.as_millis() as u64,
            max_delay_secs: limits::RETRY_MAX_DELAY.as_secs(),
            multiplier: limits::RETRY_MULTIPLIER,
        }
    }
}

/// TOML-friendly orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfigToml {
    /// Bound on concurrent downloads and installs
    pub max_concurrency: usize,
    /// Per-component install timeout in seconds
    pub install_timeout_secs: u64,
    /// Strict batch rollback on install failure
    pub strict_rollback: bool,
    /// Connectivity probe URL
    pub connectivity_probe_url: String,
    /// Skip the pre-batch connectivity check
    pub skip_connectivity_check: bool,
}

impl Default for OrchestratorConfigToml {
    fn default() -> Self {
        Self {
            max_concurrency: workers::DEFAULT_CONCURRENCY,
            install_timeout_secs: workers::INSTALL_TIMEOUT.as_secs(),
            strict_rollback: false,
            connectivity_probe_url: http::CONNECTIVITY_PROBE_URL.to_string(),
            skip_connectivity_check: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level when RUST_LOG is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing or malformed.
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from an explicit path, or fall back to defaults
    ///
    /// An explicit path that fails to load is an error; an absent implicit
    /// configuration is the normal zero-config case.
    pub async fn load_or_default(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::load(path).await,
            None => {
                debug!("No configuration file given; using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Cache configuration for the cache subsystem
    pub fn cache_config(&self, override_root: Option<PathBuf>) -> CacheConfig {
        CacheConfig {
            cache_root: override_root.or_else(|| self.cache.cache_root.clone()),
            max_age_hours: self.cache.max_age_hours,
            max_total_bytes: self.cache.max_total_bytes,
        }
    }

    /// HTTP client configuration
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            request_timeout: Duration::from_secs(self.client.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.client.connect_timeout_secs),
            pool_max_per_host: self.client.pool_max_per_host,
            rate_limit_rps: self.client.rate_limit_rps,
            ..ClientConfig::default()
        }
    }

    /// Retry policy configuration
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_secs(self.retry.max_delay_secs),
            multiplier: self.retry.multiplier,
        }
    }

    /// Orchestrator configuration
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_concurrency: self.orchestrator.max_concurrency,
            install_timeout: Duration::from_secs(self.orchestrator.install_timeout_secs),
            strict_rollback: self.orchestrator.strict_rollback,
            connectivity_probe_url: self.orchestrator.connectivity_probe_url.clone(),
            skip_connectivity_check: self.orchestrator.skip_connectivity_check,
        }
    }

    /// State directory for installer ledgers
    pub fn state_dir(&self) -> ConfigResult<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|dir| dir.join("devstrap"))
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: "state_dir".to_string(),
                    value: "<none>".to_string(),
                    reason: "no OS data directory available; set state_dir explicitly"
                        .to_string(),
                }),
        }
    }
}
