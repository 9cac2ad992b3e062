//! Batch installation orchestration
//!
//! The orchestrator drives the whole pipeline: dependency planning,
//! per-group concurrent downloads through the cache and retry coordinator,
//! per-group concurrent installs through the executor, rollback on failure,
//! and a final `BatchResult`. All collaborating services are injected at
//! construction; the orchestrator owns no hidden global state.
//!
//! # State machine
//!
//! A batch moves through `Planning -> Downloading -> Installing` per
//! independent group, ending `Completed`, `Partial` or `Failed`. Planning
//! failures (cycles, conflicts, offline) abort before any work starts. A
//! failed download excludes the component from install and marks its
//! transitive dependents skipped; a failed install rolls back that
//! component (or, in strict mode, everything installed so far in reverse
//! order, stopping the batch).
//!
//! # Module Organization
//!
//! - [`config`] - Configuration structures and validation
//! - [`signals`] - Cancellation token and CTRL-C wiring
//! - [`stats`] - Batch statistics aggregation

pub mod config;
pub mod signals;
pub mod stats;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::app::cache::DownloadCache;
use crate::app::client::{HttpHandler, RetryCoordinator};
use crate::app::graph::DependencyGraph;
use crate::app::installer::{InstallationExecutor, RollbackManager};
use crate::app::models::{
    BatchResult, ComponentId, ComponentReport, ComponentSpec, ComponentState, DownloadOutcome,
    FailureClass, InstallState, InstallationRecord,
};
use crate::app::progress::{ProgressEvent, ProgressSink};
use crate::errors::Result;

pub use config::OrchestratorConfig;
pub use signals::{spawn_ctrl_c_handler, CancellationToken};
pub use stats::BatchStats;

/// Phase of a batch run, for logging and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchPhase {
    Planning,
    Downloading,
    Installing,
}

impl std::fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Planning => write!(f, "planning"),
            Self::Downloading => write!(f, "downloading"),
            Self::Installing => write!(f, "installing"),
        }
    }
}

enum DownloadTaskResult {
    Done(DownloadOutcome),
    Cancelled,
}

enum InstallTaskResult {
    Installed(InstallationRecord),
    Failed {
        error: String,
        rolled_back: Option<InstallationRecord>,
    },
    Cancelled,
}

/// Drives dependency-ordered, bounded-parallel component installation
pub struct Orchestrator {
    config: OrchestratorConfig,
    http: Arc<HttpHandler>,
    cache: Arc<DownloadCache>,
    retry: Arc<RetryCoordinator>,
    executor: Arc<InstallationExecutor>,
    rollback: Arc<RollbackManager>,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Start building an orchestrator
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Token that cancels this orchestrator's batches at safe checkpoints
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Install a batch of components
    ///
    /// Component-level failures never unwind out of this call; they are
    /// captured in the per-component reports. Only planning-time problems
    /// (cycle, conflict, offline, invalid configuration) abort the batch,
    /// and those come back as a terminal `Failed` result with no work done.
    pub async fn install(&self, specs: Vec<ComponentSpec>) -> Result<BatchResult> {
        let start = Instant::now();
        let started_at = Utc::now();
        info!(
            "Batch of {} components entering {} phase",
            specs.len(),
            BatchPhase::Planning
        );

        // ---- Planning -------------------------------------------------
        if let Err(reason) = self.config.validate() {
            return Ok(BatchResult::planning_failure(
                vec![format!("invalid orchestrator configuration: {}", reason)],
                start.elapsed(),
            ));
        }

        let graph = match DependencyGraph::build(&specs) {
            Ok(graph) => graph,
            Err(e) => {
                return Ok(BatchResult::planning_failure(
                    vec![e.to_string()],
                    start.elapsed(),
                ))
            }
        };
        if let Err(e) = graph.ensure_acyclic() {
            return Ok(BatchResult::planning_failure(
                vec![e.to_string()],
                start.elapsed(),
            ));
        }
        // Safe: acyclicity was just established
        let order = graph.topological_order().map_err(crate::errors::AppError::Graph)?;
        let groups = graph
            .independent_groups()
            .map_err(crate::errors::AppError::Graph)?;

        if !self.config.skip_connectivity_check
            && !self.http.is_online(&self.config.connectivity_probe_url).await
        {
            return Ok(BatchResult::planning_failure(
                vec![
                    "network appears to be offline; no components were attempted. Retry later"
                        .to_string(),
                ],
                start.elapsed(),
            ));
        }

        let specs_by_name: HashMap<String, ComponentSpec> = specs
            .into_iter()
            .map(|spec| (spec.name.clone(), spec))
            .collect();
        let mut reports: HashMap<String, ComponentReport> = order
            .iter()
            .map(|name| {
                let id = specs_by_name[name].id();
                (name.clone(), ComponentReport::pending(id))
            })
            .collect();
        let mut completed_installs: Vec<ComponentId> = Vec::new();

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));

        // ---- Per-group download + install -----------------------------
        'groups: for (group_index, group) in groups.iter().enumerate() {
            if self.cancel.is_cancelled() {
                debug!("Cancellation observed before group {}", group_index);
                break 'groups;
            }

            // Members whose dependencies did not all complete are skipped
            // without being attempted.
            let mut to_download: Vec<String> = Vec::new();
            for name in group {
                let failed_dep = graph
                    .dependencies_of(name)
                    .into_iter()
                    .find(|dep| !reports[dep].state.is_completed());
                match failed_dep {
                    Some(dep) => {
                        self.mark_skipped(&mut reports, name, &dep);
                    }
                    None => to_download.push(name.clone()),
                }
            }

            info!(
                "Group {}: {} phase, {} components",
                group_index,
                BatchPhase::Downloading,
                to_download.len()
            );
            self.run_download_phase(&to_download, &specs_by_name, &mut reports, &graph, &semaphore)
                .await;

            let to_install: Vec<String> = to_download
                .iter()
                .filter(|name| {
                    matches!(reports[name.as_str()].state, ComponentState::Downloaded)
                })
                .cloned()
                .collect();

            info!(
                "Group {}: {} phase, {} components",
                group_index,
                BatchPhase::Installing,
                to_install.len()
            );
            let strict_triggered = self
                .run_install_phase(
                    &to_install,
                    &specs_by_name,
                    &mut reports,
                    &graph,
                    &semaphore,
                    &mut completed_installs,
                )
                .await;

            if strict_triggered {
                self.apply_strict_rollback(&mut reports, &completed_installs)
                    .await;
                break 'groups;
            }
        }

        // Anything never attempted is terminally cancelled
        for report in reports.values_mut() {
            if !report.state.is_terminal() {
                report.state = ComponentState::Cancelled;
            }
        }

        let ordered_reports: Vec<ComponentReport> = order
            .iter()
            .filter_map(|name| reports.remove(name))
            .collect();
        let status = BatchResult::derive_status(&ordered_reports);
        let result = BatchResult {
            order,
            reports: ordered_reports,
            status,
            planning_errors: Vec::new(),
            started_at,
            elapsed: start.elapsed(),
        };

        info!("Batch finished: {}", BatchStats::from_result(&result).summary());
        Ok(result)
    }

    /// Components whose installed state is missing or stale relative to
    /// their spec (entry point for wrapping tooling)
    pub async fn check_updates(&self, specs: &[ComponentSpec]) -> Result<Vec<String>> {
        let mut stale = Vec::new();
        for spec in specs {
            let record = self.rollback.load(&spec.id()).await?;
            let up_to_date = matches!(
                record,
                Some(ref r) if r.state == InstallState::Completed
                    && r.artifact_digest == spec.digest
            );
            if !up_to_date {
                stale.push(spec.name.clone());
            }
        }
        Ok(stale)
    }

    async fn run_download_phase(
        &self,
        members: &[String],
        specs_by_name: &HashMap<String, ComponentSpec>,
        reports: &mut HashMap<String, ComponentReport>,
        graph: &DependencyGraph,
        semaphore: &Arc<Semaphore>,
    ) {
        let mut tasks: JoinSet<(String, DownloadTaskResult)> = JoinSet::new();

        for name in members {
            if let Some(report) = reports.get_mut(name) {
                report.state = ComponentState::Downloading;
            }
            let spec = specs_by_name[name].clone();
            let cache = self.cache.clone();
            let retry = self.retry.clone();
            let sink = self.sink.clone();
            let cancel = self.cancel.clone();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (spec.name.clone(), DownloadTaskResult::Cancelled),
                };
                if cancel.is_cancelled() {
                    return (spec.name.clone(), DownloadTaskResult::Cancelled);
                }

                // Verified cache hit short-circuits the network entirely
                match cache.lookup(&spec).await {
                    Ok(Some(entry)) => {
                        let outcome = DownloadOutcome::cache_hit(entry.path);
                        sink.notify(ProgressEvent::Outcome {
                            component: spec.name.clone(),
                            outcome: outcome.clone(),
                        });
                        return (spec.name.clone(), DownloadTaskResult::Done(outcome));
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Cache lookup failed for '{}': {}", spec.name, e),
                }

                let destination: PathBuf = match &spec.digest {
                    Some(digest) => cache.artifact_path(&spec, digest),
                    // The engine refuses digest-less specs up front; this
                    // path is never written.
                    None => cache.staging_dir().join(spec.artifact_file_name()),
                };

                let outcome = retry
                    .download_with_retry(&spec, &destination, sink.as_ref())
                    .await;

                if outcome.success {
                    if let Err(e) = cache.put(&spec, &destination).await {
                        warn!("Could not index '{}' in the cache: {}", spec.name, e);
                    }
                }

                sink.notify(ProgressEvent::Outcome {
                    component: spec.name.clone(),
                    outcome: outcome.clone(),
                });
                (spec.name.clone(), DownloadTaskResult::Done(outcome))
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (name, task_result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("Download task panicked: {}", e);
                    continue;
                }
            };
            match task_result {
                DownloadTaskResult::Done(outcome) => {
                    let failed = !outcome.success;
                    let class = outcome.failure.unwrap_or(FailureClass::TransientNetwork);
                    let message = outcome.message.clone();
                    if let Some(report) = reports.get_mut(&name) {
                        report.state = if failed {
                            ComponentState::Failed {
                                class,
                                error: message,
                            }
                        } else {
                            ComponentState::Downloaded
                        };
                        report.download = Some(outcome);
                    }
                    if failed {
                        self.skip_dependents(reports, graph, &name);
                    }
                }
                DownloadTaskResult::Cancelled => {
                    if let Some(report) = reports.get_mut(&name) {
                        report.state = ComponentState::Cancelled;
                        report.download = Some(DownloadOutcome::failure(
                            FailureClass::Cancelled,
                            crate::errors::DownloadError::Cancelled.to_string(),
                            0,
                            std::time::Duration::ZERO,
                            0,
                        ));
                    }
                }
            }
        }
    }

    /// Returns true when a failure occurred and strict rollback is enabled
    async fn run_install_phase(
        &self,
        members: &[String],
        specs_by_name: &HashMap<String, ComponentSpec>,
        reports: &mut HashMap<String, ComponentReport>,
        graph: &DependencyGraph,
        semaphore: &Arc<Semaphore>,
        completed_installs: &mut Vec<ComponentId>,
    ) -> bool {
        let mut tasks: JoinSet<(String, InstallTaskResult)> = JoinSet::new();

        for name in members {
            let artifact = match reports
                .get(name)
                .and_then(|r| r.download.as_ref())
                .and_then(|o| o.final_path.clone())
            {
                Some(path) => path,
                None => continue,
            };
            if let Some(report) = reports.get_mut(name) {
                report.state = ComponentState::Installing;
            }
            let spec = specs_by_name[name].clone();
            let executor = self.executor.clone();
            let rollback = self.rollback.clone();
            let cancel = self.cancel.clone();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (spec.name.clone(), InstallTaskResult::Cancelled),
                };
                if cancel.is_cancelled() {
                    return (spec.name.clone(), InstallTaskResult::Cancelled);
                }

                match executor.install_one(&spec, &artifact).await {
                    Ok(record) => (spec.name.clone(), InstallTaskResult::Installed(record)),
                    Err(e) => {
                        // Default policy: undo this component only
                        let rolled_back = match rollback.rollback(&spec.id()).await {
                            Ok(record) => record,
                            Err(rollback_err) => {
                                warn!(
                                    "Rollback failed for '{}': {}",
                                    spec.name, rollback_err
                                );
                                None
                            }
                        };
                        (
                            spec.name.clone(),
                            InstallTaskResult::Failed {
                                error: e.to_string(),
                                rolled_back,
                            },
                        )
                    }
                }
            });
        }

        let mut any_failed = false;
        while let Some(joined) = tasks.join_next().await {
            let (name, task_result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("Install task panicked: {}", e);
                    any_failed = true;
                    continue;
                }
            };
            match task_result {
                InstallTaskResult::Installed(record) => {
                    if let Some(report) = reports.get_mut(&name) {
                        report.state = ComponentState::Completed;
                        report.install = Some(record.clone());
                    }
                    completed_installs.push(record.component);
                }
                InstallTaskResult::Failed {
                    error,
                    rolled_back,
                } => {
                    any_failed = true;
                    if let Some(report) = reports.get_mut(&name) {
                        report.state = ComponentState::Failed {
                            class: FailureClass::Installation,
                            error,
                        };
                        report.install = rolled_back;
                    }
                    self.skip_dependents(reports, graph, &name);
                }
                InstallTaskResult::Cancelled => {
                    if let Some(report) = reports.get_mut(&name) {
                        report.state = ComponentState::Cancelled;
                    }
                }
            }
        }

        any_failed && self.config.strict_rollback
    }

    /// Strict policy: undo everything installed so far, newest first, and
    /// reflect the reversal in the reports
    async fn apply_strict_rollback(
        &self,
        reports: &mut HashMap<String, ComponentReport>,
        completed_installs: &[ComponentId],
    ) {
        warn!(
            "Strict rollback: undoing {} previously installed components",
            completed_installs.len()
        );
        let rolled = self.rollback.rollback_all(completed_installs).await;
        for record in rolled {
            if let Some(report) = reports.get_mut(&record.component.name) {
                report.state = ComponentState::Failed {
                    class: FailureClass::Installation,
                    error: "rolled back by strict batch policy".to_string(),
                };
                report.install = Some(record);
            }
        }
    }

    fn mark_skipped(
        &self,
        reports: &mut HashMap<String, ComponentReport>,
        name: &str,
        failed_dependency: &str,
    ) {
        if let Some(report) = reports.get_mut(name) {
            if !report.state.is_terminal() {
                debug!(
                    "Skipping '{}': dependency '{}' did not complete",
                    name, failed_dependency
                );
                report.state = ComponentState::Skipped {
                    failed_dependency: failed_dependency.to_string(),
                };
            }
        }
    }

    fn skip_dependents(
        &self,
        reports: &mut HashMap<String, ComponentReport>,
        graph: &DependencyGraph,
        failed: &str,
    ) {
        for dependent in graph.transitive_dependents(failed) {
            self.mark_skipped(reports, &dependent, failed);
        }
    }
}

/// Builder for orchestrators with validation of required services
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: Option<OrchestratorConfig>,
    http: Option<Arc<HttpHandler>>,
    cache: Option<Arc<DownloadCache>>,
    retry: Option<Arc<RetryCoordinator>>,
    executor: Option<Arc<InstallationExecutor>>,
    rollback: Option<Arc<RollbackManager>>,
    sink: Option<Arc<dyn ProgressSink>>,
}

impl OrchestratorBuilder {
    /// Set the orchestrator configuration
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the HTTP handler (connectivity checks)
    pub fn http(mut self, http: Arc<HttpHandler>) -> Self {
        self.http = Some(http);
        self
    }

    /// Set the download cache
    pub fn cache(mut self, cache: Arc<DownloadCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the retry coordinator
    pub fn retry(mut self, retry: Arc<RetryCoordinator>) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Set the installation executor
    pub fn executor(mut self, executor: Arc<InstallationExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set the rollback manager
    pub fn rollback(mut self, rollback: Arc<RollbackManager>) -> Self {
        self.rollback = Some(rollback);
        self
    }

    /// Set the progress sink
    pub fn sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build the orchestrator (validates all required services are set)
    pub fn build(self) -> crate::errors::ConfigResult<Orchestrator> {
        fn missing(name: &str) -> crate::errors::ConfigError {
            crate::errors::ConfigError::InvalidValue {
                field: name.to_string(),
                value: "<unset>".to_string(),
                reason: "required service not provided to the orchestrator builder".to_string(),
            }
        }

        Ok(Orchestrator {
            config: self.config.unwrap_or_default(),
            http: self.http.ok_or_else(|| missing("http"))?,
            cache: self.cache.ok_or_else(|| missing("cache"))?,
            retry: self.retry.ok_or_else(|| missing("retry"))?,
            executor: self.executor.ok_or_else(|| missing("executor"))?,
            rollback: self.rollback.ok_or_else(|| missing("rollback"))?,
            sink: self
                .sink
                .unwrap_or_else(|| Arc::new(crate::app::progress::NullSink)),
            cancel: CancellationToken::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tempfile::TempDir;

    use crate::app::cache::CacheConfig;
    use crate::app::client::{ClientConfig, DownloadEngine, RetryConfig};
    use crate::app::digest::{Digest, DigestAlgorithm};
    use crate::app::installer::ProcessRunner;
    use crate::app::mirrors::{MirrorMap, MirrorResolver};
    use crate::app::models::{BatchStatus, InstallAction};

    async fn orchestrator_in(temp: &TempDir) -> Orchestrator {
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
            RollbackManager::new(temp.path().join("state")).await.unwrap(),
        );
        let executor = Arc::new(InstallationExecutor::new(
            Arc::new(ProcessRunner),
            rollback.clone(),
            Duration::from_secs(5),
        ));

        Orchestrator::builder()
            .config(OrchestratorConfig::for_testing())
            .http(http)
            .cache(cache)
            .retry(retry)
            .executor(executor)
            .rollback(rollback)
            .build()
            .unwrap()
    }

    fn spec(name: &str, deps: &[&str]) -> ComponentSpec {
        ComponentSpec {
            name: name.to_string(),
            version: "1.0".to_string(),
            url: format!("https://downloads.example.invalid/{}.bin", name),
            mirrors: Vec::new(),
            digest: Some(
                Digest::new(DigestAlgorithm::Md5, "50c9d1c465f3cbff652be1509c2e2a4e").unwrap(),
            ),
            install: InstallAction {
                program: "/bin/true".to_string(),
                args: Vec::new(),
                creates: Vec::new(),
                post_conditions: Vec::new(),
            },
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            conflicts: Vec::new(),
            size_estimate: None,
        }
    }

    #[tokio::test]
    async fn test_cycle_aborts_batch_before_any_work() {
        let temp = TempDir::new().unwrap();
        let orchestrator = orchestrator_in(&temp).await;

        let result = orchestrator
            .install(vec![spec("a", &["b"]), spec("b", &["c"]), spec("c", &["a"])])
            .await
            .unwrap();

        assert_eq!(result.status, BatchStatus::Failed);
        assert!(result.reports.is_empty());
        assert_eq!(result.planning_errors.len(), 1);
        assert!(result.planning_errors[0].contains("a -> b -> c -> a"));
    }

    #[tokio::test]
    async fn test_conflict_aborts_batch() {
        let temp = TempDir::new().unwrap();
        let orchestrator = orchestrator_in(&temp).await;

        let mut a = spec("a", &[]);
        a.conflicts = vec!["b".to_string()];
        let result = orchestrator.install(vec![a, spec("b", &[])]).await.unwrap();

        assert_eq!(result.status, BatchStatus::Failed);
        assert!(result.planning_errors[0].contains("conflicts"));
    }

    #[tokio::test]
    async fn test_cancel_before_start_marks_all_cancelled() {
        let temp = TempDir::new().unwrap();
        let orchestrator = orchestrator_in(&temp).await;
        orchestrator.cancel_token().cancel();

        let result = orchestrator
            .install(vec![spec("a", &[]), spec("b", &[])])
            .await
            .unwrap();

        assert_eq!(result.status, BatchStatus::Failed);
        assert_eq!(result.reports.len(), 2);
        assert!(result
            .reports
            .iter()
            .all(|r| r.state == ComponentState::Cancelled));
    }

    #[tokio::test]
    async fn test_check_updates_reports_uninstalled_components() {
        let temp = TempDir::new().unwrap();
        let orchestrator = orchestrator_in(&temp).await;

        let specs = vec![spec("a", &[]), spec("b", &[])];
        let stale = orchestrator.check_updates(&specs).await.unwrap();
        assert_eq!(stale, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_builder_requires_services() {
        let result = Orchestrator::builder().build();
        assert!(result.is_err());
    }
}
