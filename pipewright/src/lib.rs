//! # Pipewright
//!
//! A durable, resumable pipeline orchestration engine for event-triggered
//! agent workflows.
//!
//! Pipewright turns a normalized repository event (an issue labeled, a
//! merge request opened, a comment command) into a persisted pipeline
//! instance whose stages run in order, with:
//!
//! - **Retry with backoff**: per-stage retry budgets, exponential backoff
//!   with jitter, per-attempt timeouts
//! - **Static failure policy**: an exhausted stage blocks, aborts or is
//!   carried past, per its catalog definition
//! - **Per-project serialization**: one project never runs two pipelines
//!   concurrently; distinct projects run in parallel up to the queue bound
//! - **Crash recovery**: every transition is persisted; on restart the
//!   engine resumes from the first stage with no recorded result
//!
//! The work itself (LLM agents, git hosting APIs) stays behind the
//! [`StageExecutor`](pipeline::StageExecutor) and
//! [`Notifier`](pipeline::Notifier) capability traits.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pipewright::prelude::*;
//! use std::sync::Arc;
//!
//! let config = EngineConfig::from_env();
//! let engine = Arc::new(PipelineEngine::new(EngineOptions {
//!     store: StateStore::open(&config.state_db_path)?,
//!     audit: Arc::new(JsonlAuditLogger::new(&config.audit_dir)),
//!     notifier: Arc::new(MyNotifier),
//!     executor: Arc::new(MyAgentRunner),
//!     catalog: StageCatalog::new(),
//!     locks: ProjectLock::new(),
//!     retry_policy: RetryPolicy::new(),
//!     workspaces: WorkspaceManager::new(&config.workspace_dir),
//! }));
//!
//! let queue = TaskQueue::with_concurrency(config.queue_concurrency);
//! let handler_engine = Arc::clone(&engine);
//! queue.on_event(move |event| {
//!     let engine = Arc::clone(&handler_engine);
//!     Box::pin(async move {
//!         match engine.create(event) {
//!             Ok(instance) => {
//!                 let _ = engine.run(instance).await;
//!             }
//!             Err(err) => tracing::error!(error = %err, "failed to create pipeline"),
//!         }
//!     })
//! });
//!
//! engine.recover()?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod audit;
pub mod config;
pub mod core;
pub mod errors;
pub mod pipeline;
pub mod state;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::audit::JsonlAuditLogger;
    pub use crate::config::EngineConfig;
    pub use crate::core::{
        AuditEvent, AuditRecord, DevEvent, EventCategory, EventPayload, EventSource,
        FailurePolicy, PipelineInstance, PipelineStatus, ProjectRef, StageDefinition,
        StageResult, StageStatus,
    };
    pub use crate::errors::{PipewrightError, Result};
    pub use crate::pipeline::{
        AuditLogger, EngineOptions, Notifier, PipelineEngine, ProjectLock, RetryPolicy,
        StageCatalog, StageExecutor, StageInput, TaskQueue, WorkspaceManager,
    };
    pub use crate::state::{ListFilter, StateStore};
}
