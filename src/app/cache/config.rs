//! Cache configuration types and defaults
//!
//! This module contains the configuration structures for the download cache,
//! including default values and validation logic.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::cache;

/// Configuration for the download cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory for cache storage (OS-specific if None)
    pub cache_root: Option<PathBuf>,
    /// Maximum entry age before eviction, in hours
    pub max_age_hours: u64,
    /// Aggregate size budget in bytes (0 = unlimited)
    pub max_total_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_root: None, // Will use OS-specific cache directory
            max_age_hours: cache::DEFAULT_MAX_AGE_HOURS,
            max_total_bytes: cache::DEFAULT_MAX_TOTAL_BYTES,
        }
    }
}

impl CacheConfig {
    /// Create a configuration rooted at a specific directory
    pub fn with_cache_root(cache_root: PathBuf) -> Self {
        Self {
            cache_root: Some(cache_root),
            ..Default::default()
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.max_age_hours == 0 {
            return Err("max_age_hours must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert!(config.cache_root.is_none());
        assert_eq!(config.max_age_hours, cache::DEFAULT_MAX_AGE_HOURS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_age_rejected() {
        let config = CacheConfig {
            max_age_hours: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
