//! Pipeline orchestration: engine, catalog, lock, queue, retry policy.

pub mod catalog;
pub mod engine;
pub mod interfaces;
pub mod lock;
pub mod queue;
pub mod retry;
pub mod workspace;

pub use catalog::StageCatalog;
pub use engine::{EngineOptions, PipelineEngine};
pub use interfaces::{AuditLogger, Notifier, StageExecutor, StageInput};
pub use lock::{ProjectGuard, ProjectLock};
pub use queue::{EventHandler, TaskQueue};
pub use retry::RetryPolicy;
pub use workspace::WorkspaceManager;
