//! Core data model: events, stages, instances, audit records.

pub mod audit;
pub mod event;
pub mod instance;
pub mod stage;

pub use audit::{AuditEvent, AuditRecord};
pub use event::{DevEvent, EventCategory, EventPayload, EventSource, ProjectRef};
pub use instance::{derive_branch, PipelineInstance, PipelineStatus};
pub use stage::{FailurePolicy, StageDefinition, StageResult, StageStatus};
