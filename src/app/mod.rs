//! Core application logic for devstrap
//!
//! This module contains the installer's building blocks: digest
//! verification, the component catalog, mirror resolution, the streaming
//! download client with retry, the verified download cache, dependency
//! graph planning, install execution with rollback, and the orchestrator
//! that drives them.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use devstrap::app::cache::{CacheConfig, DownloadCache};
//! use devstrap::app::catalog::Catalog;
//! use devstrap::app::client::{ClientConfig, DownloadEngine, HttpHandler, RetryConfig, RetryCoordinator};
//! use devstrap::app::installer::{InstallationExecutor, ProcessRunner, RollbackManager};
//! use devstrap::app::mirrors::{MirrorMap, MirrorResolver};
//! use devstrap::app::orchestrator::{Orchestrator, OrchestratorConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = Catalog::load(std::path::Path::new("catalog.toml")).await?;
//!
//! let http = Arc::new(HttpHandler::new(
//!     ClientConfig::default().build_http_client()?,
//!     10,
//! )?);
//! let cache = Arc::new(DownloadCache::new(CacheConfig::default()).await?);
//! let engine = Arc::new(DownloadEngine::new(http.clone(), cache.staging_dir()));
//! let resolver = Arc::new(MirrorResolver::new(MirrorMap::default()));
//! let retry = Arc::new(RetryCoordinator::new(engine, resolver, RetryConfig::default()));
//! let rollback = Arc::new(RollbackManager::new("/var/lib/devstrap".into()).await?);
//! let executor = Arc::new(InstallationExecutor::new(
//!     Arc::new(ProcessRunner),
//!     rollback.clone(),
//!     Duration::from_secs(600),
//! ));
//!
//! let orchestrator = Orchestrator::builder()
//!     .config(OrchestratorConfig::default())
//!     .http(http)
//!     .cache(cache)
//!     .retry(retry)
//!     .executor(executor)
//!     .rollback(rollback)
//!     .build()?;
//!
//! let result = orchestrator.install(catalog.select(&[])?).await?;
//! println!("Batch status: {:?}", result.status);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod catalog;
pub mod client;
pub mod digest;
pub mod graph;
pub mod installer;
pub mod mirrors;
pub mod models;
pub mod orchestrator;
pub mod progress;

// Re-export main public API
pub use cache::{CacheConfig, DownloadCache};
pub use catalog::Catalog;
pub use client::{ClientConfig, DownloadEngine, HttpHandler, RetryConfig, RetryCoordinator};
pub use digest::{ChecksumVerifier, Digest, DigestAlgorithm};
pub use graph::DependencyGraph;
pub use installer::{InstallRunner, InstallationExecutor, ProcessRunner, RollbackManager};
pub use mirrors::{MirrorMap, MirrorResolver};
pub use models::{
    BatchResult, BatchStatus, ComponentReport, ComponentSpec, ComponentState, DownloadOutcome,
    FailureClass, InstallationRecord,
};
pub use orchestrator::{CancellationToken, Orchestrator, OrchestratorConfig};
pub use progress::{ChannelSink, NullSink, ProgressEvent, ProgressSink};
