//! Capability interfaces at the engine's boundary.
//!
//! The engine decides when, how often and with what concurrency stages
//! run; these traits are the seams where the actual work (agent
//! execution, human notification, audit storage) is plugged in.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::core::{AuditRecord, DevEvent, PipelineInstance, StageDefinition, StageResult};

/// Everything a stage executor needs to perform one attempt.
#[derive(Debug, Clone, Serialize)]
pub struct StageInput {
    /// The triggering event.
    pub event: DevEvent,
    /// Workspace directory of the instance.
    pub workspace: PathBuf,
    /// Branch the instance works on.
    pub branch: String,
    /// Id of the pipeline instance.
    pub pipeline_id: String,
    /// Results of stages that already settled, in order.
    pub previous_stages: Vec<StageResult>,
    /// The definition of the stage being attempted.
    pub stage: StageDefinition,
}

/// Performs the actual work of a stage (an LLM-driven agent, in the
/// full system). Opaque to the engine.
///
/// Implementations should honor best-effort cancellation when the
/// engine's timeout race abandons an attempt, but the engine does not
/// depend on it.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Runs the named agent against the given input.
    async fn execute(
        &self,
        agent: &str,
        input: StageInput,
        workspace: &Path,
        pipeline_id: &str,
    ) -> anyhow::Result<serde_json::Value>;
}

/// Escalates an exhausted stage to a human (typically by commenting on
/// the triggering issue or merge request).
///
/// Invoked only once per stage, after the retry budget is spent.
/// Implementations must swallow their own errors; a broken notification
/// channel must not change pipeline disposition.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Reports that `stage` exhausted its retries with `error`.
    async fn notify_human(&self, instance: &PipelineInstance, stage: &str, error: &str);
}

/// Append-only sink for engine audit records, one logical stream per
/// pipeline id.
///
/// Logging is best-effort observability: implementations must not panic
/// and should degrade to a warning on their own I/O failures.
pub trait AuditLogger: Send + Sync {
    /// Appends one record to its pipeline's stream.
    fn log(&self, record: AuditRecord);

    /// Reads back a pipeline's stream in append order.
    fn pipeline_log(&self, pipeline_id: &str) -> Vec<AuditRecord>;
}
