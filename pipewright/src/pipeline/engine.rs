//! The pipeline state machine.
//!
//! Turns an event into a durable, resumable sequence of stage
//! executions: stages run in catalog order under the project lock, every
//! transition is persisted, failures are retried with backoff, and an
//! exhausted retry budget escalates per the stage's static policy.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::{
    AuditEvent, AuditRecord, DevEvent, FailurePolicy, PipelineInstance, PipelineStatus,
    StageDefinition, StageResult,
};
use crate::errors::{PipewrightError, Result};
use crate::state::StateStore;

use super::catalog::StageCatalog;
use super::interfaces::{AuditLogger, Notifier, StageExecutor, StageInput};
use super::lock::ProjectLock;
use super::retry::RetryPolicy;
use super::workspace::WorkspaceManager;

/// Collaborators and policies the engine is constructed from.
///
/// Everything is injected; the engine owns no process-wide state, so
/// several independent engines can coexist in one process (and tests can
/// wire in scripted collaborators).
pub struct EngineOptions {
    /// Durable instance store.
    pub store: StateStore,
    /// Audit record sink.
    pub audit: Arc<dyn AuditLogger>,
    /// Human escalation channel.
    pub notifier: Arc<dyn Notifier>,
    /// Performs the stages' actual work.
    pub executor: Arc<dyn StageExecutor>,
    /// Maps event categories to stage sequences.
    pub catalog: StageCatalog,
    /// Per-project exclusion.
    pub locks: ProjectLock,
    /// Backoff between failed attempts.
    pub retry_policy: RetryPolicy,
    /// Materializes per-instance workspaces.
    pub workspaces: WorkspaceManager,
}

/// Creates, runs, resumes and inspects pipeline instances.
pub struct PipelineEngine {
    store: StateStore,
    audit: Arc<dyn AuditLogger>,
    notifier: Arc<dyn Notifier>,
    executor: Arc<dyn StageExecutor>,
    catalog: StageCatalog,
    locks: ProjectLock,
    retry_policy: RetryPolicy,
    workspaces: WorkspaceManager,
}

impl PipelineEngine {
    /// Builds an engine from its collaborators.
    #[must_use]
    pub fn new(options: EngineOptions) -> Self {
        Self {
            store: options.store,
            audit: options.audit,
            notifier: options.notifier,
            executor: options.executor,
            catalog: options.catalog,
            locks: options.locks,
            retry_policy: options.retry_policy,
            workspaces: options.workspaces,
        }
    }

    /// Creates a new `running` instance for an event: allocates the id,
    /// materializes the workspace, derives the branch and persists the
    /// initial snapshot.
    ///
    /// The workspace is part of instance creation, not of the first
    /// stage; a failed first stage still leaves it behind for diagnosis.
    pub fn create(&self, event: DevEvent) -> Result<PipelineInstance> {
        let id = Uuid::new_v4().to_string();
        let workspace = self.workspaces.create(&id)?;
        let instance = PipelineInstance::new(id, event, workspace);
        self.store.save(&instance)?;

        self.audit.log(
            AuditRecord::new(&instance.id, AuditEvent::PipelineStart)
                .with_metadata_entry("source", instance.event.source.to_string())
                .with_metadata_entry("category", instance.event.category.to_string())
                .with_metadata_entry("project_id", instance.project_id()),
        );
        tracing::info!(
            pipeline_id = %instance.id,
            project_id = %instance.project_id(),
            category = %instance.event.category,
            branch = %instance.branch,
            "pipeline created"
        );
        Ok(instance)
    }

    /// Runs an instance to a terminal status.
    ///
    /// Safe to call fresh after [`create`](Self::create) or re-entered
    /// after a process restart: the stage loop starts at the first stage
    /// with no recorded result, so already-settled stages never
    /// re-execute. Holds the project lock for the whole loop; the lock is
    /// released on every exit path, including persistence errors.
    ///
    /// Stage failures never surface as `Err` here; they end up in the
    /// instance status. `Err` means the engine itself could not proceed
    /// (state could not be persisted).
    pub async fn run(&self, mut instance: PipelineInstance) -> Result<PipelineInstance> {
        let stages: Vec<StageDefinition> = self
            .catalog
            .stages_for(instance.event.category)
            .to_vec();
        let resume_from = instance.stages.len();

        let _guard = self.locks.acquire(instance.project_id()).await;

        for stage_def in stages.iter().skip(resume_from) {
            let result = self.execute_stage_with_retry(&instance, stage_def).await;
            let failed = result.is_failure();
            instance.stages.push(result);
            self.store.save(&instance)?;

            if !failed {
                continue;
            }
            match stage_def.on_failure {
                FailurePolicy::Notify => {
                    return self.finish_failed(
                        instance,
                        stage_def,
                        PipelineStatus::Blocked,
                        "blocked_after_retries",
                    );
                }
                FailurePolicy::Abort => {
                    return self.finish_failed(
                        instance,
                        stage_def,
                        PipelineStatus::Failed,
                        "aborted",
                    );
                }
                FailurePolicy::Retry => {
                    // Recorded as failed but non-fatal: the pipeline
                    // carries on with the next stage.
                    tracing::warn!(
                        pipeline_id = %instance.id,
                        stage = %stage_def.name,
                        "stage exhausted retries, continuing per policy"
                    );
                }
            }
        }

        instance.status = PipelineStatus::Success;
        instance.completed_at = Some(Utc::now());
        self.store.save(&instance)?;
        self.audit
            .log(AuditRecord::new(&instance.id, AuditEvent::PipelineComplete));
        tracing::info!(pipeline_id = %instance.id, "pipeline complete");
        Ok(instance)
    }

    fn finish_failed(
        &self,
        mut instance: PipelineInstance,
        stage_def: &StageDefinition,
        status: PipelineStatus,
        reason: &str,
    ) -> Result<PipelineInstance> {
        instance.status = status;
        self.store.save(&instance)?;
        self.audit.log(
            AuditRecord::new(&instance.id, AuditEvent::PipelineFailed)
                .with_stage(&stage_def.name)
                .with_metadata_entry("reason", reason),
        );
        tracing::warn!(
            pipeline_id = %instance.id,
            stage = %stage_def.name,
            status = %status,
            "pipeline stopped"
        );
        Ok(instance)
    }

    /// Resumes a pipeline from a stage: drops `from_stage` and every
    /// later recorded result, resets the status to `running`, persists,
    /// and re-runs. The only entry point for resuming a `blocked`
    /// instance.
    ///
    /// # Errors
    ///
    /// [`PipewrightError::PipelineNotFound`] for an unknown id.
    pub async fn retry(&self, pipeline_id: &str, from_stage: &str) -> Result<PipelineInstance> {
        let mut instance = self
            .store
            .get(pipeline_id)?
            .ok_or_else(|| PipewrightError::PipelineNotFound(pipeline_id.to_string()))?;

        instance.truncate_from(from_stage);
        instance.status = PipelineStatus::Running;
        instance.completed_at = None;
        self.store.save(&instance)?;
        tracing::info!(
            pipeline_id = %pipeline_id,
            from_stage = %from_stage,
            recorded_stages = instance.stages.len(),
            "retrying pipeline"
        );
        self.run(instance).await
    }

    /// Read-only status lookup.
    pub fn get_status(&self, pipeline_id: &str) -> Result<Option<PipelineInstance>> {
        self.store.get(pipeline_id)
    }

    /// Resumes work after a process restart: re-spawns `run` for every
    /// persisted `running` instance and returns their ids. `blocked`
    /// instances are left for a human-triggered [`retry`](Self::retry).
    /// One instance's resume failure is logged without aborting the rest.
    pub fn recover(self: &Arc<Self>) -> Result<Vec<String>> {
        let incomplete = self.store.get_incomplete()?;
        let mut resumed = Vec::new();
        for instance in incomplete {
            if instance.status != PipelineStatus::Running {
                tracing::info!(
                    pipeline_id = %instance.id,
                    "blocked pipeline awaits manual retry"
                );
                continue;
            }
            tracing::info!(pipeline_id = %instance.id, "resuming pipeline");
            resumed.push(instance.id.clone());
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                let pipeline_id = instance.id.clone();
                if let Err(err) = engine.run(instance).await {
                    tracing::error!(
                        pipeline_id = %pipeline_id,
                        error = %err,
                        "failed to resume pipeline"
                    );
                }
            });
        }
        Ok(resumed)
    }

    /// Runs one stage's full attempt loop: `max_retries + 1` attempts,
    /// each raced against the stage timeout, with backoff sleeps in
    /// between. On exhaustion the notifier is invoked (best-effort) and
    /// a failed result is returned; nothing in here propagates as `Err`.
    async fn execute_stage_with_retry(
        &self,
        instance: &PipelineInstance,
        stage_def: &StageDefinition,
    ) -> StageResult {
        let mut last_error = String::new();

        for attempt in 0..=stage_def.max_retries {
            let started_at = Utc::now();
            let kind = if attempt == 0 {
                AuditEvent::StageStart
            } else {
                AuditEvent::StageRetry
            };
            self.audit.log(
                AuditRecord::new(&instance.id, kind)
                    .with_stage(&stage_def.name)
                    .with_metadata_entry("attempt", attempt),
            );

            let outcome = tokio::time::timeout(
                stage_def.timeout(),
                self.executor.execute(
                    &stage_def.agent,
                    self.stage_input(instance, stage_def),
                    &instance.workspace,
                    &instance.id,
                ),
            )
            .await;

            match outcome {
                Ok(Ok(_output)) => {
                    let duration_ms =
                        u64::try_from((Utc::now() - started_at).num_milliseconds().max(0))
                            .unwrap_or(0);
                    self.audit.log(
                        AuditRecord::new(&instance.id, AuditEvent::StageComplete)
                            .with_stage(&stage_def.name)
                            .with_duration_ms(duration_ms),
                    );
                    tracing::info!(
                        pipeline_id = %instance.id,
                        stage = %stage_def.name,
                        attempt,
                        duration_ms,
                        "stage complete"
                    );
                    return StageResult::succeeded(&stage_def.name, started_at, attempt);
                }
                Ok(Err(err)) => {
                    last_error = err.to_string();
                }
                Err(_elapsed) => {
                    last_error = format!(
                        "stage \"{}\" timed out after {}ms",
                        stage_def.name, stage_def.timeout_ms
                    );
                }
            }

            self.audit.log(
                AuditRecord::new(&instance.id, AuditEvent::StageFailed)
                    .with_stage(&stage_def.name)
                    .with_metadata_entry("error", last_error.clone())
                    .with_metadata_entry("attempt", attempt),
            );
            tracing::warn!(
                pipeline_id = %instance.id,
                stage = %stage_def.name,
                attempt,
                error = %last_error,
                "stage attempt failed"
            );

            if attempt < stage_def.max_retries {
                tokio::time::sleep(self.retry_policy.delay(attempt)).await;
            }
        }

        self.audit.log(
            AuditRecord::new(&instance.id, AuditEvent::NotifyHuman)
                .with_stage(&stage_def.name)
                .with_metadata_entry("error", last_error.clone()),
        );
        self.notifier
            .notify_human(instance, &stage_def.name, &last_error)
            .await;

        StageResult::failed(
            &stage_def.name,
            Utc::now(),
            stage_def.max_retries,
            last_error,
        )
    }

    fn stage_input(&self, instance: &PipelineInstance, stage_def: &StageDefinition) -> StageInput {
        StageInput {
            event: instance.event.clone(),
            workspace: instance.workspace.clone(),
            branch: instance.branch.clone(),
            pipeline_id: instance.id.clone(),
            previous_stages: instance.stages.clone(),
            stage: stage_def.clone(),
        }
    }
}
