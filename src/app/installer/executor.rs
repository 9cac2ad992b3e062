//! Installation execution with effect snapshots and post-verification
//!
//! The executor applies one component's install action: it snapshots the
//! declared filesystem effects first (backing up files that will be
//! overwritten), invokes the external runner under a bounded timeout, then
//! verifies every declared post-condition. A post-verification failure
//! counts as an installation failure. Re-installing a component whose
//! ledger already shows a completed install of the same artifact is a
//! no-op with no duplicate rollback entries.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::fs;
use tracing::{debug, info, warn};

use crate::app::installer::action::{substitute_args, InstallRunner};
use crate::app::installer::rollback::RollbackManager;
use crate::app::models::{
    ComponentSpec, InstallState, InstallationRecord, PostCondition, ReversibleAction,
};
use crate::constants::files;
use crate::errors::{InstallError, InstallResult};

/// Applies install actions and produces installation records
pub struct InstallationExecutor {
    runner: Arc<dyn InstallRunner>,
    rollback: Arc<RollbackManager>,
    install_timeout: Duration,
}

impl InstallationExecutor {
    /// Create an executor over a runner and a rollback manager
    pub fn new(
        runner: Arc<dyn InstallRunner>,
        rollback: Arc<RollbackManager>,
        install_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            rollback,
            install_timeout,
        }
    }

    /// Install one component from its verified artifact
    ///
    /// On failure the persisted ledger is left in the Failed state and the
    /// error is returned; the caller decides whether to roll back.
    ///
    /// # Errors
    ///
    /// Returns `InstallError` when the artifact is missing, the action
    /// fails or times out, or a post-condition does not hold.
    pub async fn install_one(
        &self,
        spec: &ComponentSpec,
        artifact: &Path,
    ) -> InstallResult<InstallationRecord> {
        if !artifact.exists() {
            return Err(InstallError::ArtifactMissing {
                component: spec.name.clone(),
                path: artifact.to_path_buf(),
            });
        }

        // Idempotence: an identical completed install is not repeated
        if let Some(existing) = self.rollback.load(&spec.id()).await? {
            if existing.state == InstallState::Completed
                && existing.artifact_digest == spec.digest
            {
                debug!(
                    "'{}' already installed from an identical artifact, skipping",
                    spec.name
                );
                return Ok(existing);
            }
        }

        let mut record = InstallationRecord::new(spec.id(), spec.digest.clone());

        // Snapshot planned effects before anything mutates
        self.snapshot_effects(spec, &mut record).await?;

        record.mark_in_progress();
        self.rollback.save(&record).await?;

        let args = substitute_args(&spec.install.args, artifact);
        let run = self.runner.run(spec, artifact, &args);
        let output = match tokio::time::timeout(self.install_timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                record.mark_failed();
                self.rollback.save(&record).await?;
                return Err(e);
            }
            Err(_) => {
                record.mark_failed();
                self.rollback.save(&record).await?;
                return Err(InstallError::Timeout {
                    component: spec.name.clone(),
                    seconds: self.install_timeout.as_secs(),
                });
            }
        };

        if !output.success() {
            record.mark_failed();
            self.rollback.save(&record).await?;
            return Err(InstallError::ActionFailed {
                component: spec.name.clone(),
                exit_code: output.exit_code,
                stderr: truncate(&output.stderr, 512),
            });
        }

        // A post-verification failure counts as an installation failure
        for condition in &spec.install.post_conditions {
            if !Self::check_post_condition(condition).await {
                warn!(
                    "Post-condition failed for '{}': {}",
                    spec.name, condition
                );
                record.mark_failed();
                self.rollback.save(&record).await?;
                return Err(InstallError::PostConditionFailed {
                    component: spec.name.clone(),
                    condition: condition.to_string(),
                });
            }
        }

        record.mark_completed();
        self.rollback.save(&record).await?;
        info!("Installed '{}' successfully", spec.name);
        Ok(record)
    }

    /// Record the declared effects of the action before it runs
    ///
    /// Files the action will overwrite are copied aside so rollback can
    /// restore them; paths it will create are recorded for deletion.
    async fn snapshot_effects(
        &self,
        spec: &ComponentSpec,
        record: &mut InstallationRecord,
    ) -> InstallResult<()> {
        for path in &spec.install.creates {
            if path.exists() {
                let backup = backup_path(path);
                fs::copy(path, &backup)
                    .await
                    .map_err(|e| InstallError::RunnerIo {
                        component: spec.name.clone(),
                        source: e,
                    })?;
                self.rollback
                    .record(
                        record,
                        ReversibleAction::FileBackedUp {
                            original: path.clone(),
                            backup,
                        },
                    )
                    .await?;
            } else {
                self.rollback
                    .record(
                        record,
                        ReversibleAction::FileCreated { path: path.clone() },
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn check_post_condition(condition: &PostCondition) -> bool {
        match condition {
            PostCondition::FileExists { path } => path.exists(),
            PostCondition::FileContains { path, needle } => {
                match fs::read_to_string(path).await {
                    Ok(content) => content.contains(needle.as_str()),
                    Err(_) => false,
                }
            }
        }
    }
}

fn backup_path(original: &Path) -> std::path::PathBuf {
    let file_name = original
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    original.with_file_name(format!("{}{}", file_name, files::BACKUP_SUFFIX))
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        text.to_string()
    } else {
        let mut end = limit;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}
