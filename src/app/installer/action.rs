//! External install action invocation
//!
//! The install runner is the boundary to the host system: it executes a
//! component's install program and reports exit status and captured output.
//! Production code shells out through `tokio::process`; tests inject mock
//! runners to simulate success, failure and hangs.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::app::models::ComponentSpec;
use crate::errors::{InstallError, InstallResult};

/// Captured result of one install action invocation
#[derive(Debug, Clone)]
pub struct ActionOutput {
    /// Process exit code (-1 when terminated by signal)
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl ActionOutput {
    /// Whether the action exited successfully
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Boundary trait for invoking a component's external install action
#[async_trait]
pub trait InstallRunner: Send + Sync {
    /// Run the install action synchronously to completion
    ///
    /// `args` are the fully substituted arguments (the `{artifact}`
    /// placeholder already resolved by the executor).
    async fn run(
        &self,
        spec: &ComponentSpec,
        artifact: &Path,
        args: &[String],
    ) -> InstallResult<ActionOutput>;
}

/// Production runner: spawns the install program as a child process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl InstallRunner for ProcessRunner {
    async fn run(
        &self,
        spec: &ComponentSpec,
        _artifact: &Path,
        args: &[String],
    ) -> InstallResult<ActionOutput> {
        debug!(
            "Running install action for '{}': {} {:?}",
            spec.name, spec.install.program, args
        );

        let output = tokio::process::Command::new(&spec.install.program)
            .args(args)
            .output()
            .await
            .map_err(|e| InstallError::RunnerIo {
                component: spec.name.clone(),
                source: e,
            })?;

        Ok(ActionOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Substitute the `{artifact}` placeholder in declared action arguments
pub fn substitute_args(args: &[String], artifact: &Path) -> Vec<String> {
    let artifact_str = artifact.display().to_string();
    args.iter()
        .map(|arg| arg.replace("{artifact}", &artifact_str))
        .collect()
}
