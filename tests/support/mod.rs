//! Shared fixtures for integration tests
//!
//! Builds a full service stack (HTTP handler, cache, engine, retry,
//! rollback, executor, orchestrator) against a wiremock server and a
//! temporary directory. Install actions append to a log file so tests can
//! assert completion order.

// Each integration root compiles this module independently and uses a
// different subset of it.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use devstrap::app::cache::{CacheConfig, DownloadCache};
use devstrap::app::client::{
    ClientConfig, DownloadEngine, HttpHandler, RetryConfig, RetryCoordinator,
};
use devstrap::app::digest::{ChecksumVerifier, DigestAlgorithm};
use devstrap::app::installer::{InstallationExecutor, ProcessRunner, RollbackManager};
use devstrap::app::mirrors::{MirrorMap, MirrorResolver};
use devstrap::app::models::{ComponentSpec, InstallAction};
use devstrap::app::orchestrator::{Orchestrator, OrchestratorConfig};

pub struct TestEnv {
    pub temp: TempDir,
    pub server: MockServer,
    pub orchestrator: Orchestrator,
    pub cache: Arc<DownloadCache>,
    log: PathBuf,
}

impl TestEnv {
    /// Build a full stack with default (non-strict) test configuration
    pub async fn new() -> Self {
        Self::with_config(OrchestratorConfig::for_testing()).await
    }

    /// Build a full stack with a custom orchestrator configuration
    pub async fn with_config(config: OrchestratorConfig) -> Self {
        let temp = TempDir::new().unwrap();
        let server = MockServer::start().await;

        let client = ClientConfig::for_testing().build_http_client().unwrap();
        let http = Arc::new(HttpHandler::new(client, 1000).unwrap());
        let cache = Arc::new(
            DownloadCache::new(CacheConfig::with_cache_root(temp.path().join("cache")))
                .await
                .unwrap(),
        );
        let engine = Arc::new(DownloadEngine::new(http.clone(), cache.staging_dir()));
        let resolver = Arc::new(MirrorResolver::new(MirrorMap::default()));
        let retry = Arc::new(RetryCoordinator::new(
            engine,
            resolver,
            RetryConfig::for_testing(),
        ));
        let rollback = Arc::new(
            RollbackManager::new(temp.path().join("state"))
                .await
                .unwrap(),
        );
        let executor = Arc::new(InstallationExecutor::new(
            Arc::new(ProcessRunner),
            rollback.clone(),
            Duration::from_secs(10),
        ));

        let orchestrator = Orchestrator::builder()
            .config(config)
            .http(http)
            .cache(cache.clone())
            .retry(retry)
            .executor(executor)
            .rollback(rollback)
            .build()
            .unwrap();

        let log = temp.path().join("install-order.log");
        Self {
            temp,
            server,
            orchestrator,
            cache,
            log,
        }
    }

    /// Mount a mock serving a deterministic payload and return a spec whose
    /// install action logs its own name
    pub async fn serve_component(&self, name: &str, deps: &[&str]) -> ComponentSpec {
        let payload = format!("payload-{}", name).into_bytes();
        Mock::given(method("GET"))
            .and(path(format!("/{}.bin", name)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
            .mount(&self.server)
            .await;
        self.spec_for(name, deps, &payload, 0)
    }

    /// Mount a mock that always answers with the given error status
    pub async fn serve_error(&self, name: &str, deps: &[&str], status: u16) -> ComponentSpec {
        Mock::given(method("GET"))
            .and(path(format!("/{}.bin", name)))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
        self.spec_for(name, deps, format!("payload-{}", name).as_bytes(), 0)
    }

    /// Like `serve_component`, but the install action exits non-zero
    pub async fn serve_component_failing_install(
        &self,
        name: &str,
        deps: &[&str],
    ) -> ComponentSpec {
        let payload = format!("payload-{}", name).into_bytes();
        Mock::given(method("GET"))
            .and(path(format!("/{}.bin", name)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
            .mount(&self.server)
            .await;
        self.spec_for(name, deps, &payload, 9)
    }

    /// Build a spec by hand for scenarios the mount helpers do not cover
    /// (extra mirrors, missing digests, tampered payloads)
    pub fn spec_for(&self, name: &str, deps: &[&str], payload: &[u8], exit: i32) -> ComponentSpec {
        let digest = ChecksumVerifier::compute_bytes(payload, DigestAlgorithm::Sha256);
        ComponentSpec {
            name: name.to_string(),
            version: "1.0".to_string(),
            url: format!("{}/{}.bin", self.server.uri(), name),
            mirrors: Vec::new(),
            digest: Some(digest),
            install: InstallAction {
                program: "/bin/sh".to_string(),
                args: vec![
                    "-c".to_string(),
                    format!("echo {} >> {} && exit {}", name, self.log.display(), exit),
                ],
                creates: Vec::new(),
                post_conditions: Vec::new(),
            },
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            conflicts: Vec::new(),
            size_estimate: None,
        }
    }

    /// Names in the order their install actions completed
    pub async fn install_order(&self) -> Vec<String> {
        match tokio::fs::read_to_string(&self.log).await {
            Ok(content) => content.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Total requests the mock server has seen
    pub async fn request_count(&self) -> usize {
        self.server.received_requests().await.unwrap().len()
    }
}
