//! Stage definitions and stage execution results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// What the engine does once a stage has exhausted its retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the failure and continue with the next stage.
    Retry,
    /// Mark the pipeline `blocked` and wait for a human-triggered resume.
    Notify,
    /// Mark the pipeline `failed`; no resume.
    Abort,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retry => write!(f, "retry"),
            Self::Notify => write!(f, "notify"),
            Self::Abort => write!(f, "abort"),
        }
    }
}

/// Static configuration for one stage of a pipeline.
///
/// Definitions live in the [`StageCatalog`](crate::pipeline::StageCatalog);
/// they are not persisted per instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Stage name, unique within its pipeline.
    pub name: String,
    /// Identifier of the external executor agent to invoke.
    pub agent: String,
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Disposition once retries are exhausted.
    pub on_failure: FailurePolicy,
    /// Advisory hint that the executor may fan out sub-tasks.
    /// The engine itself never runs two stages of one instance at once.
    #[serde(default)]
    pub parallel: bool,
}

impl StageDefinition {
    /// Creates a stage definition with the given retry budget and policy.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        agent: impl Into<String>,
        max_retries: u32,
        timeout_ms: u64,
        on_failure: FailurePolicy,
    ) -> Self {
        Self {
            name: name.into(),
            agent: agent.into(),
            max_retries,
            timeout_ms,
            on_failure,
            parallel: false,
        }
    }

    /// Marks the stage as parallel-capable (advisory).
    #[must_use]
    pub fn with_parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// The per-attempt timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Outcome of one stage's full retry sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// The stage produced a successful attempt.
    Success,
    /// Every attempt failed.
    Failed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// The recorded result of one stage, one entry per stage per run pass.
///
/// Immutable once appended to an instance; `retry()` replaces entries by
/// truncation, it never edits them in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    /// Name of the stage this result belongs to.
    pub stage: String,
    /// Terminal status of the retry sequence.
    pub status: StageStatus,
    /// When the last attempt started.
    pub started_at: DateTime<Utc>,
    /// When the retry sequence settled.
    pub completed_at: DateTime<Utc>,
    /// Attempts beyond the first (0 means first-try success).
    pub retries: u32,
    /// Last error message, present iff the stage failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageResult {
    /// Creates a successful result.
    #[must_use]
    pub fn succeeded(
        stage: impl Into<String>,
        started_at: DateTime<Utc>,
        retries: u32,
    ) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Success,
            started_at,
            completed_at: Utc::now(),
            retries,
            error: None,
        }
    }

    /// Creates a failed result carrying the last error seen.
    #[must_use]
    pub fn failed(
        stage: impl Into<String>,
        started_at: DateTime<Utc>,
        retries: u32,
        error: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Failed,
            started_at,
            completed_at: Utc::now(),
            retries,
            error: Some(error.into()),
        }
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, StageStatus::Success)
    }

    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self.status, StageStatus::Failed)
    }

    /// Wall-clock duration of the recorded attempt window in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }
}
