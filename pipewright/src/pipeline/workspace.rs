//! Per-instance workspace directories.
//!
//! Layout: `{root}/{pipeline_id}/` with artifacts under
//! `{root}/{pipeline_id}/.pipewright/{pipeline_id}/`. One workspace per
//! instance; the workspace exists from instance creation so a failed
//! first stage still leaves it behind for diagnosis.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::errors::Result;

/// Artifact directory name inside each workspace.
const ARTIFACT_DIR: &str = ".pipewright";

/// Creates, resolves and sweeps workspace directories under one root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Creates a manager rooted at `root`. The root itself is created
    /// lazily on the first `create`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root all workspaces live under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Materializes the workspace and artifact directory for an
    /// instance, returning the workspace path.
    pub fn create(&self, pipeline_id: &str) -> Result<PathBuf> {
        let workspace = self.root.join(pipeline_id);
        fs::create_dir_all(workspace.join(ARTIFACT_DIR).join(pipeline_id))?;
        Ok(workspace)
    }

    /// The workspace path for an instance, whether or not it exists.
    #[must_use]
    pub fn path(&self, pipeline_id: &str) -> PathBuf {
        self.root.join(pipeline_id)
    }

    /// Deletes an instance's workspace, if present.
    pub fn remove(&self, pipeline_id: &str) -> Result<()> {
        let workspace = self.path(pipeline_id);
        if workspace.exists() {
            fs::remove_dir_all(workspace)?;
        }
        Ok(())
    }

    /// Deletes workspaces not modified within the retention window.
    /// Returns how many were removed. Unreadable entries are skipped.
    pub fn sweep_expired(&self, retain: Duration) -> Result<usize> {
        if !self.root.exists() {
            return Ok(0);
        }
        let cutoff = SystemTime::now() - retain;
        let mut removed = 0;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
                continue;
            };
            if modified < cutoff {
                fs::remove_dir_all(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
