//! Rollback of recorded installation effects
//!
//! Every reversible action a component's installation applies is appended to
//! a per-component ledger and persisted immediately, so a crash mid-install
//! still leaves enough on disk to undo. Rollback replays the ledger in
//! reverse, best-effort: an undo that fails becomes a warning on the record
//! and the remaining undos still run.

use std::path::PathBuf;

use tokio::fs;
use tracing::{debug, info, warn};

use crate::app::models::{ComponentId, InstallationRecord, ReversibleAction};
use crate::constants::state;
use crate::errors::{InstallError, InstallResult};

/// Manages per-component installation ledgers and their reversal
#[derive(Debug)]
pub struct RollbackManager {
    ledger_dir: PathBuf,
}

impl RollbackManager {
    /// Create a manager persisting ledgers under the given state directory
    ///
    /// # Errors
    ///
    /// Returns `InstallError` if the ledger directory cannot be created.
    pub async fn new(state_dir: PathBuf) -> InstallResult<Self> {
        let ledger_dir = state_dir.join(state::LEDGER_DIR);
        fs::create_dir_all(&ledger_dir)
            .await
            .map_err(|e| InstallError::LedgerIo {
                component: "<state dir>".to_string(),
                source: e,
            })?;
        Ok(Self { ledger_dir })
    }

    fn ledger_path(&self, id: &ComponentId) -> PathBuf {
        self.ledger_dir
            .join(format!("{}-{}.json", id.name, id.version))
    }

    /// Append a reversible action to a record and persist the ledger
    pub async fn record(
        &self,
        record: &mut InstallationRecord,
        action: ReversibleAction,
    ) -> InstallResult<()> {
        record.record_action(action);
        self.save(record).await
    }

    /// Persist a record's current state
    pub async fn save(&self, record: &InstallationRecord) -> InstallResult<()> {
        let path = self.ledger_path(&record.component);
        let content = serde_json::to_string_pretty(record).map_err(|e| InstallError::LedgerIo {
            component: record.component.name.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        fs::write(&path, content)
            .await
            .map_err(|e| InstallError::LedgerIo {
                component: record.component.name.clone(),
                source: e,
            })
    }

    /// Load the persisted record for a component, if any
    pub async fn load(&self, id: &ComponentId) -> InstallResult<Option<InstallationRecord>> {
        let path = self.ledger_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| InstallError::LedgerIo {
                component: id.name.clone(),
                source: e,
            })?;
        match serde_json::from_str(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                // An unreadable ledger must not wedge the component forever
                warn!("Discarding unreadable ledger for {}: {}", id, e);
                Ok(None)
            }
        }
    }

    /// Undo a component's recorded effects, in reverse order
    ///
    /// Best-effort: failed undos are collected as warnings on the record and
    /// do not stop the remaining undos. The record ends marked rolled-back
    /// and is persisted. Returns `None` when no ledger exists.
    pub async fn rollback(&self, id: &ComponentId) -> InstallResult<Option<InstallationRecord>> {
        let mut record = match self.load(id).await? {
            Some(record) => record,
            None => {
                debug!("No ledger to roll back for {}", id);
                return Ok(None);
            }
        };

        info!(
            "Rolling back {} recorded actions for {}",
            record.actions.len(),
            id
        );

        let actions: Vec<ReversibleAction> = record.actions.iter().rev().cloned().collect();
        for action in actions {
            if let Err(problem) = Self::undo(&action).await {
                warn!("Undo failed for {}: {}", id, problem);
                record.warnings.push(problem);
            }
        }

        record.mark_rolled_back();
        self.save(&record).await?;
        Ok(Some(record))
    }

    /// Strict-mode batch rollback: undo every component in reverse order
    ///
    /// Undo failures stay warnings on the individual records; a ledger I/O
    /// failure for one component is reported but does not stop the rest.
    pub async fn rollback_all(&self, installed: &[ComponentId]) -> Vec<InstallationRecord> {
        let mut rolled_back = Vec::new();
        for id in installed.iter().rev() {
            match self.rollback(id).await {
                Ok(Some(record)) => rolled_back.push(record),
                Ok(None) => {}
                Err(e) => warn!("Strict rollback failed for {}: {}", id, e),
            }
        }
        rolled_back
    }

    async fn undo(action: &ReversibleAction) -> Result<(), String> {
        match action {
            ReversibleAction::FileCreated { path } => {
                if path.exists() {
                    fs::remove_file(path)
                        .await
                        .map_err(|e| format!("could not remove {}: {}", path.display(), e))
                } else {
                    // Already gone; nothing to undo
                    Ok(())
                }
            }
            ReversibleAction::DirCreated { path } => {
                if path.exists() {
                    fs::remove_dir(path)
                        .await
                        .map_err(|e| format!("could not remove dir {}: {}", path.display(), e))
                } else {
                    Ok(())
                }
            }
            ReversibleAction::FileBackedUp { original, backup } => fs::rename(backup, original)
                .await
                .map_err(|e| {
                    format!(
                        "could not restore {} from {}: {}",
                        original.display(),
                        backup.display(),
                        e
                    )
                }),
        }
    }
}
