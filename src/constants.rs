//! Application constants for devstrap
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = "devstrap/0.1.0 (Component Installer)";

    /// Default HTTP request timeout (per download attempt)
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 8;

    /// Timeout for mirror reachability probes (diagnostics only)
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

    /// URL probed by the connectivity check before a batch starts
    pub const CONNECTIVITY_PROBE_URL: &str = "https://example.com/";
}

/// Retry and rate limiting configuration
pub mod limits {
    use super::Duration;

    /// Default rate limit for outbound requests (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 10;

    /// Maximum download attempts per candidate URL
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Base delay for exponential backoff
    pub const RETRY_INITIAL_DELAY: Duration = Duration::from_millis(500);

    /// Maximum backoff delay between attempts
    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(60);

    /// Backoff multiplier between successive attempts
    pub const RETRY_MULTIPLIER: f64 = 2.0;
}

/// File operation constants
pub mod files {
    /// Staging file suffix for atomic downloads
    pub const STAGING_SUFFIX: &str = ".part";

    /// Backup file suffix used when installs overwrite existing files
    pub const BACKUP_SUFFIX: &str = ".devstrap-bak";

    /// Download chunk granularity for progress reporting (bytes)
    pub const PROGRESS_CHUNK_BYTES: u64 = 64 * 1024;
}

/// Download cache constants
pub mod cache {
    /// Cache index file name
    pub const CACHE_INDEX_FILE: &str = "index.json";

    /// Subdirectory holding content-addressed artifacts
    pub const OBJECTS_DIR: &str = "objects";

    /// Subdirectory for in-flight staging files
    pub const STAGING_DIR: &str = "staging";

    /// Default maximum cache entry age before eviction (hours)
    pub const DEFAULT_MAX_AGE_HOURS: u64 = 24 * 14;

    /// Default aggregate cache size budget (bytes, 0 = unlimited)
    pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 10 * 1024 * 1024 * 1024;
}

/// Worker and concurrency configuration
pub mod workers {
    use super::Duration;

    /// Default bound on concurrent downloads and installs
    pub const DEFAULT_CONCURRENCY: usize = 3;

    /// Maximum recommended concurrency
    pub const MAX_CONCURRENCY: usize = 16;

    /// Per-component install action timeout
    pub const INSTALL_TIMEOUT: Duration = Duration::from_secs(600);

    /// Channel buffer size for progress notifications
    pub const PROGRESS_CHANNEL_CAPACITY: usize = 256;
}

/// Progress reporting constants
pub mod progress {
    /// Rolling window size for download rate calculation (samples)
    pub const RATE_WINDOW_SIZE: usize = 10;

    /// Minimum samples before an ETA is reported
    pub const MIN_ETA_SAMPLES: usize = 2;
}

/// Installer state constants
pub mod state {
    /// Directory (under the state root) holding per-component install ledgers
    pub const LEDGER_DIR: &str = "ledgers";
}

// Re-export commonly used constants for convenience
pub use cache::CACHE_INDEX_FILE;
pub use files::STAGING_SUFFIX;
pub use http::{DEFAULT_TIMEOUT as HTTP_TIMEOUT, USER_AGENT};
pub use limits::{DEFAULT_RATE_LIMIT_RPS, MAX_ATTEMPTS};
pub use workers::DEFAULT_CONCURRENCY;
