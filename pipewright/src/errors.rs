//! Error types for the pipewright engine.
//!
//! Transient stage failures never surface here; they are contained by the
//! retry loop and recorded on the instance. These variants cover the
//! propagating class: persistence faults and programmer errors.

use thiserror::Error;

/// The main error type for pipewright operations.
#[derive(Debug, Error)]
pub enum PipewrightError {
    /// A pipeline id was not found in the state store.
    #[error("pipeline not found: {0}")]
    PipelineNotFound(String),

    /// `enqueue` was called before a handler was registered.
    #[error("no event handler registered")]
    HandlerNotRegistered,

    /// The state store could not be read or written. Fatal: an instance
    /// whose state cannot be durably recorded must not continue.
    #[error("state store error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A persisted instance or audit record could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Workspace or audit directory I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A stage executor reported a failure.
    #[error("stage execution failed: {0}")]
    StageExecution(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipewrightError>;
