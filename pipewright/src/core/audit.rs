//! Audit records: one line per observable engine event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The kinds of observable engine events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    /// An instance was created.
    PipelineStart,
    /// Every stage completed.
    PipelineComplete,
    /// A stage failure ended the run (blocked or aborted).
    PipelineFailed,
    /// First attempt of a stage started.
    StageStart,
    /// A retry attempt of a stage started.
    StageRetry,
    /// A stage attempt failed.
    StageFailed,
    /// A stage settled successfully.
    StageComplete,
    /// The retry budget was exhausted and a human was notified.
    NotifyHuman,
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PipelineStart => write!(f, "pipeline_start"),
            Self::PipelineComplete => write!(f, "pipeline_complete"),
            Self::PipelineFailed => write!(f, "pipeline_failed"),
            Self::StageStart => write!(f, "stage_start"),
            Self::StageRetry => write!(f, "stage_retry"),
            Self::StageFailed => write!(f, "stage_failed"),
            Self::StageComplete => write!(f, "stage_complete"),
            Self::NotifyHuman => write!(f, "notify_human"),
        }
    }
}

/// One appended line in a pipeline's audit stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// When the record was produced.
    pub timestamp: DateTime<Utc>,
    /// The pipeline instance this record belongs to.
    pub pipeline_id: String,
    /// The stage involved, when stage-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// What happened.
    pub event: AuditEvent,
    /// Duration in milliseconds, for completion records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Free-form context (attempt counts, error messages, reasons).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AuditRecord {
    /// Creates a record timestamped now.
    #[must_use]
    pub fn new(pipeline_id: impl Into<String>, event: AuditEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            pipeline_id: pipeline_id.into(),
            stage: None,
            event,
            duration_ms: None,
            metadata: HashMap::new(),
        }
    }

    /// Sets the stage name.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Adds a single metadata entry.
    #[must_use]
    pub fn with_metadata_entry(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
