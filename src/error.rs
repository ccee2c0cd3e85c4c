//! Error types for the generation orchestrator.

use crate::task::TaskStatus;
use crate::types::{ArtifactKind, InvalidTaskId, TaskId};
use thiserror::Error;

/// Artifact and input storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid artifact locator: {0}")]
    InvalidLocator(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failure of a single backend attempt.
///
/// These never reach callers of the orchestrator directly; they are recorded on
/// the failed task as a message plus [`BackendError::code`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Remote job {job_id} did not finish after {attempts} polls")]
    Timeout { job_id: String, attempts: u32 },

    /// Provider-reported failure, or a transport/auth error. The message is the
    /// provider's text when one was given.
    #[error("{0}")]
    Failure(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Generation cancelled")]
    Cancelled,

    #[error("No backend produced authentic output: {0}")]
    NotAuthentic(String),
}

impl BackendError {
    /// Machine-checkable code recorded on failed tasks.
    pub fn code(&self) -> &'static str {
        match self {
            BackendError::Timeout { .. } => "backend_timeout",
            BackendError::Failure(_) => "backend_failure",
            BackendError::Pipeline(_) => "pipeline_error",
            BackendError::Cancelled => "cancelled",
            BackendError::NotAuthentic(_) => "not_authentic",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BackendError::Cancelled)
    }
}

/// Task registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Task already exists: {0}")]
    AlreadyExists(TaskId),

    #[error("Invalid transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
}

/// Errors returned directly from orchestrator operations
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Task already exists: {0}")]
    AlreadyExists(TaskId),

    #[error("Artifact {kind} for task {task_id} is not ready (status: {status})")]
    NotReady {
        task_id: TaskId,
        kind: ArtifactKind,
        status: TaskStatus,
    },

    #[error("Artifact {kind} for task {task_id} is missing from storage")]
    ArtifactMissing { task_id: TaskId, kind: ArtifactKind },

    #[error("Orchestrator at capacity ({limit} concurrent generations)")]
    AtCapacity { limit: usize },

    #[error("Orchestrator is shutting down")]
    ShuttingDown,

    #[error("Timed out waiting for task {0}")]
    WaitTimeout(TaskId),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error(transparent)]
    InvalidTaskId(#[from] InvalidTaskId),

    #[error("Registry error: {0}")]
    Registry(RegistryError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to encode output: {0}")]
    Encode(String),
}

impl From<RegistryError> for OrchestratorError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => OrchestratorError::NotFound(id),
            RegistryError::AlreadyExists(id) => OrchestratorError::AlreadyExists(id),
            other => OrchestratorError::Registry(other),
        }
    }
}

impl From<config::ConfigError> for OrchestratorError {
    fn from(err: config::ConfigError) -> Self {
        OrchestratorError::ConfigError(err.to_string())
    }
}
