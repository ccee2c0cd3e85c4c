//! Generation task records and their state machine.
//!
//! ```text
//! Pending --dispatch--> Processing --success--> Completed
//!    |                      |------failure----> Failed
//!    |                      '------cancel-----> Cancelled
//!    '--cancel / admission failure--> Cancelled | Failed
//! ```
//!
//! Terminal states never change again, and artifact locators are present exactly
//! when the task is Completed.

use crate::artifact::{ArtifactLocator, InputRef};
use crate::error::{BackendError, RegistryError};
use crate::types::{ArtifactSet, GenerationParameters, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a generation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is an edge of the state machine. Self-transitions
    /// are rejected.
    pub fn can_transition_to(&self, next: &Self) -> bool {
        if self == next {
            return false;
        }

        match self {
            Self::Pending => matches!(next, Self::Processing | Self::Failed | Self::Cancelled),
            Self::Processing => matches!(next, Self::Completed | Self::Failed | Self::Cancelled),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }

    pub fn validate_transition(&self, task_id: &TaskId, next: &Self) -> Result<(), RegistryError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(RegistryError::InvalidTransition {
                task_id: task_id.clone(),
                from: *self,
                to: *next,
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Human-readable status line shown to clients.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Pending => "Task is pending",
            Self::Processing => "3D model is being generated",
            Self::Completed => "3D model generation completed",
            Self::Failed => "3D model generation failed",
            Self::Cancelled => "3D model generation cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure recorded on a Failed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub message: String,
    pub code: String,
}

impl TaskFailure {
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
        }
    }
}

impl From<&BackendError> for TaskFailure {
    fn from(err: &BackendError) -> Self {
        Self::new(err.to_string(), err.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTimestamps {
    pub created: DateTime<Utc>,
    pub started: Option<DateTime<Utc>>,
    /// When the task reached a terminal state.
    pub completed: Option<DateTime<Utc>>,
}

impl TaskTimestamps {
    fn latest(&self) -> DateTime<Utc> {
        self.completed.or(self.started).unwrap_or(self.created)
    }
}

/// A single atomic change applied through the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskMutation {
    /// Pending -> Processing.
    Dispatch,
    Complete(ArtifactSet<ArtifactLocator>),
    Fail(TaskFailure),
    Cancel,
}

impl TaskMutation {
    pub fn target_status(&self) -> TaskStatus {
        match self {
            TaskMutation::Dispatch => TaskStatus::Processing,
            TaskMutation::Complete(_) => TaskStatus::Completed,
            TaskMutation::Fail(_) => TaskStatus::Failed,
            TaskMutation::Cancel => TaskStatus::Cancelled,
        }
    }
}

/// One generation request and its tracked lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationTask {
    id: TaskId,
    status: TaskStatus,
    parameters: GenerationParameters,
    input: InputRef,
    artifacts: Option<ArtifactSet<ArtifactLocator>>,
    error: Option<TaskFailure>,
    timestamps: TaskTimestamps,
}

impl GenerationTask {
    pub fn new(
        id: TaskId,
        parameters: GenerationParameters,
        input: InputRef,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status: TaskStatus::Pending,
            parameters,
            input,
            artifacts: None,
            error: None,
            timestamps: TaskTimestamps {
                created: now,
                started: None,
                completed: None,
            },
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn parameters(&self) -> &GenerationParameters {
        &self.parameters
    }

    pub fn input(&self) -> &InputRef {
        &self.input
    }

    pub fn artifacts(&self) -> Option<&ArtifactSet<ArtifactLocator>> {
        self.artifacts.as_ref()
    }

    pub fn error(&self) -> Option<&TaskFailure> {
        self.error.as_ref()
    }

    pub fn timestamps(&self) -> &TaskTimestamps {
        &self.timestamps
    }

    /// Apply a mutation, enforcing the state machine.
    ///
    /// On error the task is left untouched.
    pub fn apply(&mut self, mutation: TaskMutation, now: DateTime<Utc>) -> Result<(), RegistryError> {
        let next = mutation.target_status();
        self.status.validate_transition(&self.id, &next)?;

        // Wall clocks can step backwards; timestamps must not.
        let now = now.max(self.timestamps.latest());

        match mutation {
            TaskMutation::Dispatch => {
                self.timestamps.started = Some(now);
            }
            TaskMutation::Complete(locators) => {
                self.artifacts = Some(locators);
                self.timestamps.completed = Some(now);
            }
            TaskMutation::Fail(failure) => {
                self.error = Some(failure);
                self.timestamps.completed = Some(now);
            }
            TaskMutation::Cancel => {
                self.timestamps.completed = Some(now);
            }
        }
        self.status = next;
        Ok(())
    }

    pub fn view(&self) -> TaskView {
        TaskView {
            id: self.id.clone(),
            status: self.status,
            message: self.status.message().to_string(),
            parameters: self.parameters,
            artifacts: self.artifacts.clone(),
            error: self.error.clone(),
            timestamps: self.timestamps.clone(),
        }
    }
}

/// Read-only snapshot of a task returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: TaskId,
    pub status: TaskStatus,
    pub message: String,
    pub parameters: GenerationParameters,
    pub artifacts: Option<ArtifactSet<ArtifactLocator>>,
    pub error: Option<TaskFailure>,
    pub timestamps: TaskTimestamps,
}
