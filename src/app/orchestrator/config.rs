//! Orchestrator configuration and validation

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{http, workers};

/// Configuration for a batch orchestration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Bound on concurrent downloads, and separately on concurrent installs
    pub max_concurrency: usize,
    /// Per-component install action timeout
    #[serde(with = "humantime_serde")]
    pub install_timeout: Duration,
    /// Roll back every component installed so far when one install fails,
    /// in reverse install order, and stop the batch. Default rolls back
    /// only the failing component and continues.
    pub strict_rollback: bool,
    /// URL probed by the pre-batch connectivity check
    pub connectivity_probe_url: String,
    /// Skip the connectivity check entirely (offline fixtures, tests)
    pub skip_connectivity_check: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: workers::DEFAULT_CONCURRENCY,
            install_timeout: workers::INSTALL_TIMEOUT,
            strict_rollback: false,
            connectivity_probe_url: http::CONNECTIVITY_PROBE_URL.to_string(),
            skip_connectivity_check: false,
        }
    }
}

impl OrchestratorConfig {
    /// Configuration for tests: no connectivity probe, short timeouts
    pub fn for_testing() -> Self {
        Self {
            max_concurrency: 2,
            install_timeout: Duration::from_secs(5),
            strict_rollback: false,
            connectivity_probe_url: http::CONNECTIVITY_PROBE_URL.to_string(),
            skip_connectivity_check: true,
        }
    }

    /// Set the concurrency bound
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Enable strict batch rollback
    pub fn with_strict_rollback(mut self, strict: bool) -> Self {
        self.strict_rollback = strict;
        self
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be greater than 0".to_string());
        }
        if self.max_concurrency > workers::MAX_CONCURRENCY {
            return Err(format!(
                "max_concurrency {} exceeds the supported maximum of {}",
                self.max_concurrency,
                workers::MAX_CONCURRENCY
            ));
        }
        if self.install_timeout.is_zero() {
            return Err("install_timeout must be non-zero".to_string());
        }
        Ok(())
    }
}
