//! Pipeline instances: one concrete run of a pipeline for one event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::event::{DevEvent, EventCategory};
use super::stage::StageResult;

/// Lifecycle status of a pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    /// Stages are executing or waiting to execute.
    Running,
    /// Every stage completed; `completed_at` is set.
    Success,
    /// A stage failed under an abort policy; no resume.
    Failed,
    /// A stage exhausted retries under a notify policy; awaits a
    /// human-triggered `retry`.
    Blocked,
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

impl PipelineStatus {
    /// Returns true if `run()` will not advance this instance further.
    /// `blocked` is terminal for `run`; only `retry` resumes it.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One concrete run of a pipeline for one triggering event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineInstance {
    /// Unique instance id, assigned at creation.
    pub id: String,
    /// The triggering event, owned by the instance.
    pub event: DevEvent,
    /// Current lifecycle status.
    pub status: PipelineStatus,
    /// Working directory for this instance.
    pub workspace: PathBuf,
    /// Branch name derived from the event, reused by stage executors.
    pub branch: String,
    /// Ordered log of settled stage results, one per stage.
    pub stages: Vec<StageResult>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Completion timestamp, set only on terminal success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineInstance {
    /// Creates a fresh `running` instance with no recorded stages.
    ///
    /// The branch name is derived here, once, from the event shape.
    #[must_use]
    pub fn new(id: impl Into<String>, event: DevEvent, workspace: PathBuf) -> Self {
        let id = id.into();
        let branch = derive_branch(&event, &id);
        Self {
            id,
            event,
            status: PipelineStatus::Running,
            workspace,
            branch,
            stages: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// The id of the project this instance belongs to (the lock key).
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.event.project.id
    }

    /// Drops `from_stage` and everything recorded after it.
    ///
    /// No-op when the stage is not recorded, which makes repeated calls
    /// idempotent relative to the same stage boundary.
    pub fn truncate_from(&mut self, from_stage: &str) {
        if let Some(idx) = self.stages.iter().position(|s| s.stage == from_stage) {
            self.stages.truncate(idx);
        }
    }
}

/// Derives the working branch for an event.
///
/// Scaffold runs target the project's default branch; merge-request
/// triggers get `fix/mr-{iid}`; everything else gets a feature branch
/// named after the issue, falling back to a prefix of the instance id.
#[must_use]
pub fn derive_branch(event: &DevEvent, instance_id: &str) -> String {
    if event.category == EventCategory::Scaffold {
        let default = event.project.default_branch.as_str();
        return if default.is_empty() { "main".to_string() } else { default.to_string() };
    }
    if let Some(mr_iid) = event.payload.mr_iid {
        return format!("fix/mr-{mr_iid}");
    }
    match event.payload.issue_iid {
        Some(issue_iid) => format!("feature/issue-{issue_iid}"),
        None => {
            let prefix: String = instance_id.chars().take(8).collect();
            format!("feature/issue-{prefix}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::{EventPayload, EventSource, ProjectRef};

    fn event(category: EventCategory, payload: EventPayload) -> DevEvent {
        DevEvent::new(
            "evt-1",
            EventSource::Gitlab,
            category,
            ProjectRef::new("123", "demo", "git@example.com:demo.git", "develop"),
        )
        .with_payload(payload)
    }

    #[test]
    fn test_branch_for_scaffold_uses_default_branch() {
        let e = event(EventCategory::Scaffold, EventPayload::default());
        assert_eq!(derive_branch(&e, "abcdef1234"), "develop");
    }

    #[test]
    fn test_branch_for_mr_event() {
        let e = event(
            EventCategory::MrComment,
            EventPayload {
                mr_iid: Some(7),
                ..EventPayload::default()
            },
        );
        assert_eq!(derive_branch(&e, "abcdef1234"), "fix/mr-7");
    }

    #[test]
    fn test_branch_for_issue_event() {
        let e = event(
            EventCategory::IssueLabeled,
            EventPayload {
                issue_iid: Some(42),
                ..EventPayload::default()
            },
        );
        assert_eq!(derive_branch(&e, "abcdef1234"), "feature/issue-42");
    }

    #[test]
    fn test_branch_falls_back_to_id_prefix() {
        let e = event(EventCategory::Manual, EventPayload::default());
        assert_eq!(derive_branch(&e, "abcdef1234"), "feature/issue-abcdef12");
    }

    #[test]
    fn test_new_instance_is_running_and_empty() {
        let e = event(EventCategory::Manual, EventPayload::default());
        let instance = PipelineInstance::new("pipe-1", e, PathBuf::from("/tmp/ws"));
        assert_eq!(instance.status, PipelineStatus::Running);
        assert!(instance.stages.is_empty());
        assert!(instance.completed_at.is_none());
        assert_eq!(instance.project_id(), "123");
    }

    #[test]
    fn test_truncate_from_is_idempotent() {
        let e = event(EventCategory::Manual, EventPayload::default());
        let mut instance = PipelineInstance::new("pipe-1", e, PathBuf::from("/tmp/ws"));
        instance.stages.push(StageResult::succeeded("analyze", Utc::now(), 0));
        instance.stages.push(StageResult::succeeded("design", Utc::now(), 0));
        instance
            .stages
            .push(StageResult::failed("implement", Utc::now(), 3, "boom"));

        instance.truncate_from("design");
        assert_eq!(instance.stages.len(), 1);
        instance.truncate_from("design");
        assert_eq!(instance.stages.len(), 1);
        assert_eq!(instance.stages[0].stage, "analyze");
    }

    #[test]
    fn test_status_terminality() {
        assert!(!PipelineStatus::Running.is_terminal());
        assert!(PipelineStatus::Success.is_terminal());
        assert!(PipelineStatus::Failed.is_terminal());
        assert!(PipelineStatus::Blocked.is_terminal());
    }
}
