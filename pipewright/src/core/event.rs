//! Normalized repository events that trigger pipelines.
//!
//! The webhook/adapter layers own parsing and signature verification;
//! by the time an event reaches this crate it has already been reduced
//! to the shapes below.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The hosting platform an event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    /// GitLab webhook or API trigger.
    Gitlab,
    /// GitHub webhook or API trigger.
    Github,
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gitlab => write!(f, "gitlab"),
            Self::Github => write!(f, "github"),
        }
    }
}

/// The kind of repository activity that triggered an event.
///
/// The category selects which stage sequence the catalog returns and
/// feeds into branch-name derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// An issue received the trigger label.
    IssueLabeled,
    /// A merge request was opened.
    MrCreated,
    /// A merge request received new commits.
    MrUpdated,
    /// A command comment was left on a merge request.
    MrComment,
    /// Operator-initiated run, same pipeline as a labeled issue.
    Manual,
    /// Bootstrap a project from an empty repository.
    Scaffold,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IssueLabeled => write!(f, "issue_labeled"),
            Self::MrCreated => write!(f, "mr_created"),
            Self::MrUpdated => write!(f, "mr_updated"),
            Self::MrComment => write!(f, "mr_comment"),
            Self::Manual => write!(f, "manual"),
            Self::Scaffold => write!(f, "scaffold"),
        }
    }
}

/// Identity of the project an event belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    /// Platform-scoped project identifier. Lock key for mutual exclusion.
    pub id: String,
    /// Human-readable project name.
    pub name: String,
    /// URL used by stage executors to clone the repository.
    pub clone_url: String,
    /// The repository's default branch.
    pub default_branch: String,
}

impl ProjectRef {
    /// Creates a project reference.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        clone_url: impl Into<String>,
        default_branch: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            clone_url: clone_url.into(),
            default_branch: default_branch.into(),
        }
    }
}

/// Event payload fields shared by all categories.
///
/// Which fields are populated depends on the category: issue events carry
/// `issue_iid`, merge-request events carry `mr_iid`, comment events carry
/// `comment`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    /// Issue internal id, when the trigger was an issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_iid: Option<u64>,
    /// Merge request internal id, when the trigger was a merge request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mr_iid: Option<u64>,
    /// Title of the triggering issue or merge request.
    pub title: String,
    /// Body text of the triggering issue or merge request.
    pub description: String,
    /// Labels on the triggering issue.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    /// Comment text, for comment-triggered events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Author of the triggering activity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// A normalized trigger event, the input to pipeline creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevEvent {
    /// Unique event id assigned by the dispatcher.
    pub id: String,
    /// Originating platform.
    pub source: EventSource,
    /// Activity category; selects the stage sequence.
    pub category: EventCategory,
    /// When the dispatcher accepted the event.
    pub received_at: DateTime<Utc>,
    /// Project the event belongs to.
    pub project: ProjectRef,
    /// Category-dependent payload.
    pub payload: EventPayload,
}

impl DevEvent {
    /// Creates an event with an empty payload, timestamped now.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        source: EventSource,
        category: EventCategory,
        project: ProjectRef,
    ) -> Self {
        Self {
            id: id.into(),
            source,
            category,
            received_at: Utc::now(),
            project,
            payload: EventPayload::default(),
        }
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = payload;
        self
    }
}
