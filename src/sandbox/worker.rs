//! Worker execution surface.
//!
//! The controller talks to the worker exclusively through this interface:
//! file operations against a shared scratch directory plus a blocking
//! command invocation. Remote providers implement the same traits; the
//! subprocess provider here runs the generated program with a local Node.js
//! for development and tests.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::sandbox::error::{Result, SandboxError};

/// Output of a worker command invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// One provisioned worker.
///
/// File names are relative to the worker's scratch directory.
#[async_trait]
pub trait WorkerSession: Send + Sync {
    /// Absolute path of the scratch directory, as seen by the worker.
    fn scratch_dir(&self) -> &str;

    /// Write a file, replacing any existing content.
    async fn write_file(&self, name: &str, contents: &str) -> Result<()>;

    /// Read a file. `None` if it does not exist.
    async fn read_file(&self, name: &str) -> Result<Option<String>>;

    /// Delete a file if present.
    async fn delete_file(&self, name: &str) -> Result<()>;

    /// List file names in the scratch directory, in listing order.
    async fn list_files(&self) -> Result<Vec<String>>;

    /// Run a command to completion inside the worker.
    async fn run_command(&self, cmd: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Creates workers on demand.
#[async_trait]
pub trait WorkerProvider: Send + Sync {
    /// Provision a fresh worker.
    ///
    /// Implementations should surface authentication problems as
    /// [`SandboxError::AuthRequired`] so callers can distinguish a terminal
    /// credential failure from a transient one.
    async fn provision(&self) -> Result<Arc<dyn WorkerSession>>;
}

/// Worker backed by a local subprocess and a temporary scratch directory.
pub struct SubprocessWorker {
    scratch: TempDir,
    scratch_path: String,
}

impl SubprocessWorker {
    fn create() -> Result<Self> {
        let scratch = tempfile::tempdir().map_err(|e| SandboxError::ProvisioningFailed {
            reason: format!("could not create scratch directory: {e}"),
        })?;
        let scratch_path = scratch.path().display().to_string();
        Ok(Self {
            scratch,
            scratch_path,
        })
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.scratch.path().join(name)
    }
}

#[async_trait]
impl WorkerSession for SubprocessWorker {
    fn scratch_dir(&self) -> &str {
        &self.scratch_path
    }

    async fn write_file(&self, name: &str, contents: &str) -> Result<()> {
        tokio::fs::write(self.resolve(name), contents)
            .await
            .map_err(|e| SandboxError::Worker {
                reason: format!("write {name}: {e}"),
            })
    }

    async fn read_file(&self, name: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.resolve(name)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SandboxError::Worker {
                reason: format!("read {name}: {e}"),
            }),
        }
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        match tokio::fs::remove_file(self.resolve(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SandboxError::Worker {
                reason: format!("delete {name}: {e}"),
            }),
        }
    }

    async fn list_files(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(self.scratch.path())
            .await
            .map_err(|e| SandboxError::Worker {
                reason: format!("list scratch: {e}"),
            })?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| SandboxError::Worker {
            reason: format!("list scratch: {e}"),
        })? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn run_command(&self, cmd: &str, args: &[String]) -> Result<CommandOutput> {
        let output = tokio::process::Command::new(cmd)
            .args(args)
            .current_dir(self.scratch.path())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SandboxError::Worker {
                reason: format!("spawn {cmd}: {e}"),
            })?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Provider that provisions [`SubprocessWorker`]s.
#[derive(Debug)]
pub struct SubprocessWorkerProvider {
    runtime_command: String,
}

impl SubprocessWorkerProvider {
    pub fn new(runtime_command: impl Into<String>) -> Self {
        Self {
            runtime_command: runtime_command.into(),
        }
    }

    /// Whether the configured runtime is present on this machine.
    pub async fn is_available(&self) -> bool {
        tokio::process::Command::new(&self.runtime_command)
            .arg("--version")
            .output()
            .await
            .map(|out| out.status.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl WorkerProvider for SubprocessWorkerProvider {
    async fn provision(&self) -> Result<Arc<dyn WorkerSession>> {
        tracing::debug!("provisioning subprocess worker");
        Ok(Arc::new(SubprocessWorker::create()?))
    }
}
