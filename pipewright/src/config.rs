//! Engine configuration: storage paths and queue width.
//!
//! Credentials and platform endpoints belong to the adapter layers; this
//! config only covers what the orchestration core itself touches.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_QUEUE_CONCURRENCY: usize = 5;

/// Filesystem layout and concurrency settings for one engine process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root directory for all engine-owned data.
    pub data_dir: PathBuf,
    /// Where per-instance workspaces are materialized.
    pub workspace_dir: PathBuf,
    /// Where per-pipeline audit streams are written.
    pub audit_dir: PathBuf,
    /// Path of the SQLite state database.
    pub state_db_path: PathBuf,
    /// How many pipelines may run concurrently across all projects.
    pub queue_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("./data");
        Self {
            workspace_dir: data_dir.join("workspaces"),
            audit_dir: data_dir.join("audit"),
            state_db_path: data_dir.join("pipeline.db"),
            data_dir,
            queue_concurrency: DEFAULT_QUEUE_CONCURRENCY,
        }
    }
}

impl EngineConfig {
    /// Builds a config rooted at `data_dir` with the default layout.
    #[must_use]
    pub fn rooted_at(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            workspace_dir: data_dir.join("workspaces"),
            audit_dir: data_dir.join("audit"),
            state_db_path: data_dir.join("pipeline.db"),
            data_dir,
            queue_concurrency: DEFAULT_QUEUE_CONCURRENCY,
        }
    }

    /// Loads the config from `PIPEWRIGHT_*` environment variables,
    /// falling back to the defaults for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = std::env::var("PIPEWRIGHT_DATA_DIR")
            .map_or_else(|_| Self::default(), Self::rooted_at);

        if let Ok(dir) = std::env::var("PIPEWRIGHT_WORKSPACE_DIR") {
            config.workspace_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("PIPEWRIGHT_AUDIT_DIR") {
            config.audit_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("PIPEWRIGHT_STATE_DB") {
            config.state_db_path = PathBuf::from(path);
        }
        if let Ok(n) = std::env::var("PIPEWRIGHT_QUEUE_CONCURRENCY") {
            if let Ok(n) = n.parse::<usize>() {
                if n > 0 {
                    config.queue_concurrency = n;
                }
            }
        }
        config
    }

    /// Sets the queue concurrency.
    #[must_use]
    pub fn with_queue_concurrency(mut self, concurrency: usize) -> Self {
        self.queue_concurrency = concurrency;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let config = EngineConfig::default();
        assert_eq!(config.workspace_dir, PathBuf::from("./data/workspaces"));
        assert_eq!(config.state_db_path, PathBuf::from("./data/pipeline.db"));
        assert_eq!(config.queue_concurrency, 5);
    }

    #[test]
    fn test_rooted_at() {
        let config = EngineConfig::rooted_at("/var/lib/pipewright");
        assert_eq!(
            config.audit_dir,
            PathBuf::from("/var/lib/pipewright/audit")
        );
    }

    #[test]
    fn test_with_queue_concurrency() {
        let config = EngineConfig::default().with_queue_concurrency(12);
        assert_eq!(config.queue_concurrency, 12);
    }
}
