//! Error types for devstrap
//!
//! This module defines the error types for all components of the installer.
//! Errors are designed to be actionable: every terminal failure carries a
//! remediation hint for the user (retry later, download manually, resolve
//! the dependency cycle).

use std::path::PathBuf;
use thiserror::Error;

/// Download and HTTP client errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// HTTP request error
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    /// I/O error during file operations
    #[error("File I/O error")]
    Io(#[from] std::io::Error),

    /// Component has no integrity digest - downloading would be unverifiable
    #[error(
        "Refusing to download '{component}': no integrity digest declared. \
         Add a digest to the catalog entry before installing"
    )]
    MissingDigest { component: String },

    /// Digest verification failed after download
    #[error("Digest mismatch for '{component}'. Expected: {expected}, got: {actual}")]
    DigestMismatch {
        component: String,
        expected: String,
        actual: String,
    },

    /// Download timeout
    #[error("Download timed out after {seconds} seconds. Retry later")]
    Timeout { seconds: u64 },

    /// Invalid URL provided
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// Server returned error status
    #[error("Server error: HTTP {status}")]
    ServerError { status: u16 },

    /// Rate limit exceeded
    #[error("Rate limit exceeded. Server responded with HTTP 429")]
    RateLimitExceeded,

    /// Incomplete transfer against the advertised content length
    #[error("Incomplete download: received {received} bytes, expected {expected} bytes")]
    IncompleteDownload { received: u64, expected: u64 },

    /// Atomic file operation failed
    #[error("Atomic file operation failed: could not rename {staging_path} to {final_path}")]
    AtomicOperationFailed {
        staging_path: PathBuf,
        final_path: PathBuf,
    },

    /// Every candidate URL was exhausted without a verified artifact
    #[error(
        "All download sources exhausted for '{component}' after {attempts} attempts \
         (tried: {attempted_urls:?}). Download the file manually from {primary_url} \
         and place it in the cache"
    )]
    MirrorsExhausted {
        component: String,
        attempts: u32,
        attempted_urls: Vec<String>,
        primary_url: String,
    },

    /// Batch was cancelled before this download started
    #[error("Download cancelled before it started")]
    Cancelled,
}

/// Download cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Cache directory not found or inaccessible
    #[error("Cache directory not accessible: {path}")]
    DirectoryNotAccessible { path: PathBuf },

    /// Cache index corruption
    #[error("Cache index corrupted: {reason}")]
    IndexCorrupted { reason: String },

    /// I/O error during cache operations
    #[error("Cache I/O error")]
    Io(#[from] std::io::Error),

    /// Invalid cache state
    #[error("Invalid cache state: {reason}")]
    InvalidState { reason: String },
}

/// Dependency graph errors
#[derive(Error, Debug)]
pub enum GraphError {
    /// Two catalog entries share a name
    #[error("Duplicate component name in batch: '{name}'")]
    DuplicateComponent { name: String },

    /// A declared dependency is not part of the batch
    #[error("Component '{component}' depends on '{dependency}', which is not in the batch")]
    UnknownDependency {
        component: String,
        dependency: String,
    },

    /// The graph contains one or more cycles and cannot be ordered
    #[error("Dependency cycle detected. Resolve dependency cycle: {}", format_cycles(.cycles))]
    CyclicDependency { cycles: Vec<Vec<String>> },

    /// Two batch members declare a conflict with each other
    #[error("Conflicting components in the same batch: '{a}' conflicts with '{b}'")]
    ConflictingComponents { a: String, b: String },
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|cycle| {
            let mut path = cycle.join(" -> ");
            if let Some(first) = cycle.first() {
                path.push_str(" -> ");
                path.push_str(first);
            }
            path
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Installation execution and rollback errors
#[derive(Error, Debug)]
pub enum InstallError {
    /// The external install action exited non-zero
    #[error("Install action for '{component}' failed with exit code {exit_code}: {stderr}")]
    ActionFailed {
        component: String,
        exit_code: i32,
        stderr: String,
    },

    /// The install runner could not be invoked at all
    #[error("Failed to invoke install action for '{component}'")]
    RunnerIo {
        component: String,
        #[source]
        source: std::io::Error,
    },

    /// The install action exceeded its time budget
    #[error("Install action for '{component}' timed out after {seconds} seconds")]
    Timeout { component: String, seconds: u64 },

    /// A declared post-condition did not hold after the action ran
    #[error("Post-condition failed for '{component}': {condition}")]
    PostConditionFailed { component: String, condition: String },

    /// Ledger persistence failed
    #[error("Failed to persist installation record for '{component}'")]
    LedgerIo {
        component: String,
        #[source]
        source: std::io::Error,
    },

    /// The artifact to install is missing or unreadable
    #[error("Artifact not found for '{component}': {path}")]
    ArtifactMissing { component: String, path: PathBuf },
}

/// Configuration and catalog errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Digest algorithm name not recognized
    #[error("Unsupported digest algorithm: '{name}'. Supported: md5, sha256")]
    UnsupportedAlgorithm { name: String },

    /// Malformed digest value for the declared algorithm
    #[error("Invalid {algorithm} digest: '{value}'")]
    InvalidDigest { algorithm: String, value: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// Catalog entry validation failed
    #[error("Invalid catalog entry '{component}': {reason}")]
    InvalidComponent { component: String, reason: String },

    /// A requested component is not present in the catalog
    #[error("Component '{name}' not found in catalog")]
    ComponentNotFound { name: String },

    /// I/O error reading configuration or catalog
    #[error("I/O error reading configuration")]
    Io(#[from] std::io::Error),
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Download error
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Cache error
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Dependency graph error
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Installation error
    #[error(transparent)]
    Install(#[from] InstallError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    ///
    /// Recoverable errors are worth retrying with backoff; everything else is
    /// terminal for its scope and surfaced immediately.
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Download(DownloadError::Http(_))
            | AppError::Download(DownloadError::Timeout { .. })
            | AppError::Download(DownloadError::RateLimitExceeded)
            | AppError::Download(DownloadError::ServerError { .. })
            | AppError::Download(DownloadError::IncompleteDownload { .. })
            | AppError::Download(DownloadError::Io(_)) => true,

            AppError::Download(DownloadError::MissingDigest { .. })
            | AppError::Download(DownloadError::MirrorsExhausted { .. })
            | AppError::Graph(_)
            | AppError::Config(_) => false,

            _ => false,
        }
    }

    /// Get error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Download(_) => "download",
            AppError::Cache(_) => "cache",
            AppError::Graph(_) => "graph",
            AppError::Install(_) => "install",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Download result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// Cache result type alias
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Graph result type alias
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Install result type alias
pub type InstallResult<T> = std::result::Result<T, InstallError>;

/// Config result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_formatting_names_the_cycle() {
        let err = GraphError::CyclicDependency {
            cycles: vec![vec!["a".to_string(), "b".to_string()]],
        };
        let message = err.to_string();
        assert!(message.contains("a -> b -> a"), "got: {message}");
    }

    #[test]
    fn test_mirrors_exhausted_names_attempted_urls() {
        let err = DownloadError::MirrorsExhausted {
            component: "jq".to_string(),
            attempts: 3,
            attempted_urls: vec![
                "https://primary.example/jq".to_string(),
                "https://mirror.example/jq".to_string(),
            ],
            primary_url: "https://primary.example/jq".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("primary.example"));
        assert!(message.contains("mirror.example"));
        assert!(message.contains("manually"));
    }

    #[test]
    fn test_recoverability_classification() {
        let transient = AppError::Download(DownloadError::Timeout { seconds: 30 });
        assert!(transient.is_recoverable());

        let security = AppError::Download(DownloadError::MissingDigest {
            component: "jq".to_string(),
        });
        assert!(!security.is_recoverable());

        let config = AppError::Config(ConfigError::UnsupportedAlgorithm {
            name: "crc32".to_string(),
        });
        assert!(!config.is_recoverable());
        assert_eq!(config.category(), "config");
    }
}
