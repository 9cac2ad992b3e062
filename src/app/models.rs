//! Data models for devstrap
//!
//! This module defines the core data structures used throughout the
//! installer: component specifications, download outcomes, installation
//! records, and batch results. Component records are fully typed with
//! explicit optional fields; there are no ad hoc field lookups.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::digest::Digest;
use crate::errors::DownloadError;

/// Stable identity of a component: name plus version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentId {
    /// Unique component name within a catalog
    pub name: String,
    /// Version string (opaque, compared for equality only)
    pub version: String,
}

impl ComponentId {
    /// Create a new component identity
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// A declared post-condition checked after the install action runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PostCondition {
    /// A file must exist at the given path
    FileExists { path: PathBuf },
    /// A file must exist and contain the given substring
    FileContains { path: PathBuf, needle: String },
}

impl fmt::Display for PostCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileExists { path } => write!(f, "file exists: {}", path.display()),
            Self::FileContains { path, needle } => {
                write!(f, "file {} contains '{}'", path.display(), needle)
            }
        }
    }
}

/// Descriptor for the external install action of a component
///
/// The action is executed by the injected install runner. `creates` declares
/// the filesystem paths the action will produce or overwrite; the executor
/// snapshots these before running so a failed install can be rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallAction {
    /// Program to invoke
    pub program: String,
    /// Arguments; the literal `{artifact}` is replaced with the artifact path
    #[serde(default)]
    pub args: Vec<String>,
    /// Paths the action creates or overwrites (snapshot targets for rollback)
    #[serde(default)]
    pub creates: Vec<PathBuf>,
    /// Post-conditions verified after the action exits successfully
    #[serde(default)]
    pub post_conditions: Vec<PostCondition>,
}

/// Specification of a single installable component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Unique component name
    pub name: String,
    /// Version string
    pub version: String,
    /// Primary download URL
    pub url: String,
    /// Manually configured mirror URLs, tried after the primary
    #[serde(default)]
    pub mirrors: Vec<String>,
    /// Required integrity digest. Mandatory for any component that triggers
    /// a network fetch; absence is a terminal security failure at download
    /// time, never retried.
    pub digest: Option<Digest>,
    /// Install action descriptor
    pub install: InstallAction,
    /// Names of components that must be installed first
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Names of components this one cannot coexist with in a batch
    #[serde(default)]
    pub conflicts: Vec<String>,
    /// Estimated artifact size in bytes, for progress reporting
    #[serde(default)]
    pub size_estimate: Option<u64>,
}

impl ComponentSpec {
    /// Identity of this component
    pub fn id(&self) -> ComponentId {
        ComponentId::new(self.name.clone(), self.version.clone())
    }

    /// File name the artifact is stored under, derived from the primary URL
    ///
    /// Falls back to the component name when the URL has no usable last
    /// path segment.
    pub fn artifact_file_name(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|segments| segments.last().map(String::from))
            })
            .filter(|segment| !segment.is_empty())
            .unwrap_or_else(|| self.name.clone())
    }
}

/// Classification of a component-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Missing or empty required digest; terminal, never retried
    Security,
    /// Digest mismatch after download; retried against a different mirror
    Verification,
    /// Connection, timeout or I/O failure; retried with backoff
    TransientNetwork,
    /// Unsupported algorithm, malformed spec, cyclic dependency; terminal
    Configuration,
    /// Install action or post-verification failure; triggers rollback
    Installation,
    /// Batch cancellation before the component was attempted
    Cancelled,
}

impl From<&DownloadError> for FailureClass {
    fn from(error: &DownloadError) -> Self {
        match error {
            DownloadError::MissingDigest { .. } => Self::Security,
            DownloadError::DigestMismatch { .. } => Self::Verification,
            DownloadError::InvalidUrl { .. } => Self::Configuration,
            DownloadError::Cancelled => Self::Cancelled,
            _ => Self::TransientNetwork,
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Security => "security",
            Self::Verification => "verification",
            Self::TransientNetwork => "transient_network",
            Self::Configuration => "configuration",
            Self::Installation => "installation",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", label)
    }
}

/// Immutable result of one download operation (across all retries/mirrors)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadOutcome {
    /// Whether a verified artifact was produced
    pub success: bool,
    /// Final artifact path on success
    pub final_path: Option<PathBuf>,
    /// Bytes transferred over the network (0 for cache hits)
    pub bytes_transferred: u64,
    /// Wall-clock time spent
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    /// Whether digest verification passed
    pub verified: bool,
    /// Failed attempts before the terminal result
    pub retry_count: u32,
    /// Failure classification, if unsuccessful
    pub failure: Option<FailureClass>,
    /// Human-readable summary naming the serving URL or the failure
    pub message: String,
}

impl DownloadOutcome {
    /// Build a successful outcome
    pub fn success(
        final_path: PathBuf,
        bytes_transferred: u64,
        elapsed: Duration,
        retry_count: u32,
        source_url: &str,
    ) -> Self {
        Self {
            success: true,
            final_path: Some(final_path),
            bytes_transferred,
            elapsed,
            verified: true,
            retry_count,
            failure: None,
            message: format!("downloaded and verified from {}", source_url),
        }
    }

    /// Build an outcome for a verified cache hit (no network activity)
    pub fn cache_hit(final_path: PathBuf) -> Self {
        Self {
            success: true,
            final_path: Some(final_path),
            bytes_transferred: 0,
            elapsed: Duration::ZERO,
            verified: true,
            retry_count: 0,
            failure: None,
            message: "served from verified download cache".to_string(),
        }
    }

    /// Build a failed outcome
    pub fn failure(
        failure: FailureClass,
        message: impl Into<String>,
        retry_count: u32,
        elapsed: Duration,
        bytes_transferred: u64,
    ) -> Self {
        Self {
            success: false,
            final_path: None,
            bytes_transferred,
            elapsed,
            verified: false,
            retry_count,
            failure: Some(failure),
            message: message.into(),
        }
    }
}

/// Status of an installation ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallState {
    /// Record created, action not yet started
    Pending,
    /// Install action running
    InProgress,
    /// Action and post-conditions succeeded
    Completed,
    /// Action or post-conditions failed
    Failed,
    /// Recorded effects were undone after a failure
    RolledBack,
}

impl InstallState {
    /// Check if this state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::RolledBack)
    }
}

/// A reversible filesystem effect recorded during installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReversibleAction {
    /// A file the install action created; undo deletes it
    FileCreated { path: PathBuf },
    /// A directory the install action created; undo removes it if empty
    DirCreated { path: PathBuf },
    /// An existing file saved aside before being overwritten; undo restores it
    FileBackedUp { original: PathBuf, backup: PathBuf },
}

/// Per-component ledger of reversible actions and install status
///
/// Created when installation starts, mutated as actions apply, consumed by
/// the rollback manager. Persisted as JSON so an interrupted run can still
/// be rolled back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationRecord {
    /// Component this ledger belongs to
    pub component: ComponentId,
    /// Digest of the artifact that was installed, for idempotence checks
    pub artifact_digest: Option<Digest>,
    /// Current status
    pub state: InstallState,
    /// Recorded reversible actions, in application order
    pub actions: Vec<ReversibleAction>,
    /// When installation started
    pub started_at: DateTime<Utc>,
    /// When the record reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
    /// Non-fatal problems encountered during rollback
    pub warnings: Vec<String>,
}

impl InstallationRecord {
    /// Create a fresh record for a component about to be installed
    pub fn new(component: ComponentId, artifact_digest: Option<Digest>) -> Self {
        Self {
            component,
            artifact_digest,
            state: InstallState::Pending,
            actions: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            warnings: Vec::new(),
        }
    }

    /// Append a reversible action to the ledger
    pub fn record_action(&mut self, action: ReversibleAction) {
        self.actions.push(action);
    }

    /// Mark the install action as running
    pub fn mark_in_progress(&mut self) {
        self.state = InstallState::InProgress;
    }

    /// Mark the installation completed
    pub fn mark_completed(&mut self) {
        self.state = InstallState::Completed;
        self.finished_at = Some(Utc::now());
    }

    /// Mark the installation failed
    pub fn mark_failed(&mut self) {
        self.state = InstallState::Failed;
        self.finished_at = Some(Utc::now());
    }

    /// Mark the record rolled back
    pub fn mark_rolled_back(&mut self) {
        self.state = InstallState::RolledBack;
        self.finished_at = Some(Utc::now());
    }
}

/// Terminal state of one component within a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentState {
    /// Not yet attempted
    Pending,
    /// Download in flight
    Downloading,
    /// Verified artifact available, install not yet started
    Downloaded,
    /// Install action in flight
    Installing,
    /// Downloaded and installed successfully
    Completed,
    /// Download or install failed
    Failed { class: FailureClass, error: String },
    /// Not attempted because a dependency failed
    Skipped { failed_dependency: String },
    /// Not attempted because the batch was cancelled
    Cancelled,
}

impl ComponentState {
    /// Check if this state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed { .. } | Self::Skipped { .. } | Self::Cancelled
        )
    }

    /// Check if the component completed successfully
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Check if the component failed
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Check if the component was skipped because of a failed dependency
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Downloading => write!(f, "downloading"),
            Self::Downloaded => write!(f, "downloaded"),
            Self::Installing => write!(f, "installing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed { class, error } => write!(f, "failed ({}): {}", class, error),
            Self::Skipped { failed_dependency } => {
                write!(f, "skipped: dependency '{}' failed", failed_dependency)
            }
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Everything the batch learned about one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentReport {
    /// Component identity
    pub id: ComponentId,
    /// Terminal (or last observed) state
    pub state: ComponentState,
    /// Download outcome, if a download was attempted or served from cache
    pub download: Option<DownloadOutcome>,
    /// Installation ledger, if installation was attempted
    pub install: Option<InstallationRecord>,
}

impl ComponentReport {
    /// Create a pending report for a component
    pub fn pending(id: ComponentId) -> Self {
        Self {
            id,
            state: ComponentState::Pending,
            download: None,
            install: None,
        }
    }
}

/// Overall status of a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every component completed
    Completed,
    /// Some components completed, some did not
    Partial,
    /// No component completed
    Failed,
}

/// Result of one orchestrator run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    /// Components in planned install order
    pub order: Vec<String>,
    /// Per-component reports, in planned order
    pub reports: Vec<ComponentReport>,
    /// Overall status
    pub status: BatchStatus,
    /// Planning-time diagnostics that aborted the batch, if any
    pub planning_errors: Vec<String>,
    /// When the batch started
    pub started_at: DateTime<Utc>,
    /// Total wall-clock time
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

impl BatchResult {
    /// Build a terminal-failed result for a batch that never started work
    pub fn planning_failure(errors: Vec<String>, elapsed: Duration) -> Self {
        Self {
            order: Vec::new(),
            reports: Vec::new(),
            status: BatchStatus::Failed,
            planning_errors: errors,
            started_at: Utc::now(),
            elapsed,
        }
    }

    /// Look up the report for a component by name
    pub fn report(&self, name: &str) -> Option<&ComponentReport> {
        self.reports.iter().find(|r| r.id.name == name)
    }

    /// Count of components in a given predicate
    pub fn count_completed(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.state.is_completed())
            .count()
    }

    /// Count of failed components
    pub fn count_failed(&self) -> usize {
        self.reports.iter().filter(|r| r.state.is_failed()).count()
    }

    /// Derive the overall batch status from the component reports
    ///
    /// Completed when nothing went wrong, Failed when nothing succeeded,
    /// Partial otherwise. An empty batch is trivially Completed.
    pub fn derive_status(reports: &[ComponentReport]) -> BatchStatus {
        let completed = reports.iter().filter(|r| r.state.is_completed()).count();
        let unsuccessful = reports.iter().filter(|r| !r.state.is_completed()).count();
        if unsuccessful == 0 {
            BatchStatus::Completed
        } else if completed == 0 {
            BatchStatus::Failed
        } else {
            BatchStatus::Partial
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::digest::DigestAlgorithm;

    pub(crate) fn spec_with_deps(name: &str, deps: &[&str]) -> ComponentSpec {
        ComponentSpec {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            url: format!("https://downloads.example.com/{}/{}.tar.gz", name, name),
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

    #[test]
    fn test_component_id_display() {
        let id = ComponentId::new("ripgrep", "14.1.0");
        assert_eq!(id.to_string(), "ripgrep@14.1.0");
    }

    #[test]
    fn test_artifact_file_name_from_url() {
        let spec = spec_with_deps("ripgrep", &[]);
        assert_eq!(spec.artifact_file_name(), "ripgrep.tar.gz");

        let mut bare = spec_with_deps("tool", &[]);
        bare.url = "https://example.com/".to_string();
        assert_eq!(bare.artifact_file_name(), "tool");
    }

    #[test]
    fn test_failure_class_from_download_error() {
        let missing = DownloadError::MissingDigest {
            component: "x".to_string(),
        };
        assert_eq!(FailureClass::from(&missing), FailureClass::Security);

        let mismatch = DownloadError::DigestMismatch {
            component: "x".to_string(),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert_eq!(FailureClass::from(&mismatch), FailureClass::Verification);

        let timeout = DownloadError::Timeout { seconds: 10 };
        assert_eq!(FailureClass::from(&timeout), FailureClass::TransientNetwork);
    }

    #[test]
    fn test_outcome_constructors() {
        let ok = DownloadOutcome::success(
            PathBuf::from("/tmp/a"),
            1024,
            Duration::from_secs(2),
            1,
            "https://mirror.example.com/a",
        );
        assert!(ok.success);
        assert!(ok.verified);
        assert_eq!(ok.retry_count, 1);
        assert!(ok.message.contains("mirror.example.com"));

        let hit = DownloadOutcome::cache_hit(PathBuf::from("/tmp/a"));
        assert!(hit.success);
        assert_eq!(hit.bytes_transferred, 0);

        let failed = DownloadOutcome::failure(
            FailureClass::Verification,
            "digest mismatch",
            2,
            Duration::from_secs(1),
            512,
        );
        assert!(!failed.success);
        assert_eq!(failed.failure, Some(FailureClass::Verification));
        assert!(failed.final_path.is_none());
    }

    #[test]
    fn test_installation_record_lifecycle() {
        let mut record = InstallationRecord::new(ComponentId::new("jq", "1.7"), None);
        assert_eq!(record.state, InstallState::Pending);
        assert!(!record.state.is_terminal());

        record.mark_in_progress();
        record.record_action(ReversibleAction::FileCreated {
            path: PathBuf::from("/usr/local/bin/jq"),
        });
        record.mark_completed();

        assert_eq!(record.state, InstallState::Completed);
        assert!(record.state.is_terminal());
        assert!(record.finished_at.is_some());
        assert_eq!(record.actions.len(), 1);
    }

    #[test]
    fn test_component_state_predicates() {
        assert!(ComponentState::Completed.is_terminal());
        assert!(ComponentState::Cancelled.is_terminal());
        assert!(!ComponentState::Downloading.is_terminal());

        let skipped = ComponentState::Skipped {
            failed_dependency: "openssl".to_string(),
        };
        assert!(skipped.is_skipped());
        assert!(skipped.to_string().contains("openssl"));
    }

    #[test]
    fn test_batch_status_derivation() {
        let completed = ComponentReport {
            id: ComponentId::new("a", "1"),
            state: ComponentState::Completed,
            download: None,
            install: None,
        };
        let failed = ComponentReport {
            id: ComponentId::new("b", "1"),
            state: ComponentState::Failed {
                class: FailureClass::TransientNetwork,
                error: "timeout".to_string(),
            },
            download: None,
            install: None,
        };

        assert_eq!(
            BatchResult::derive_status(&[completed.clone()]),
            BatchStatus::Completed
        );
        assert_eq!(
            BatchResult::derive_status(&[completed.clone(), failed.clone()]),
            BatchStatus::Partial
        );
        assert_eq!(
            BatchResult::derive_status(&[failed]),
            BatchStatus::Failed
        );
        assert_eq!(BatchResult::derive_status(&[]), BatchStatus::Completed);
    }

    #[test]
    fn test_batch_result_serde_roundtrip() {
        let result = BatchResult {
            order: vec!["a".to_string()],
            reports: vec![ComponentReport::pending(ComponentId::new("a", "1"))],
            status: BatchStatus::Completed,
            planning_errors: Vec::new(),
            started_at: Utc::now(),
            elapsed: Duration::from_secs(3),
        };
        let json = serde_json::to_string(&result).unwrap();
        let back: BatchResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.order, result.order);
        assert_eq!(back.status, BatchStatus::Completed);
    }
}
