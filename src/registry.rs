//! Task registry: the single source of truth for task status.
//!
//! Backed by [`DashMap`], so mutations of one task id take that entry's shard lock
//! while reads and mutations of other ids proceed concurrently.

use crate::artifact::InputRef;
use crate::error::RegistryError;
use crate::task::{GenerationTask, TaskMutation, TaskStatus};
use crate::types::{GenerationParameters, TaskId};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: DashMap<TaskId, GenerationTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new Pending task. Fails if the id is already present.
    pub fn create(
        &self,
        id: TaskId,
        parameters: GenerationParameters,
        input: InputRef,
    ) -> Result<GenerationTask, RegistryError> {
        match self.tasks.entry(id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyExists(id)),
            Entry::Vacant(slot) => {
                let task = GenerationTask::new(id, parameters, input, Utc::now());
                debug!(task_id = %task.id(), "Task registered");
                slot.insert(task.clone());
                Ok(task)
            }
        }
    }

    pub fn get(&self, id: &TaskId) -> Option<GenerationTask> {
        self.tasks.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    /// Apply one mutation atomically and return the updated task.
    pub fn update(&self, id: &TaskId, mutation: TaskMutation) -> Result<GenerationTask, RegistryError> {
        let mut entry = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        let from = entry.status();
        entry.apply(mutation, Utc::now())?;
        debug!(task_id = %id, from = %from, to = %entry.status(), "Task transitioned");
        Ok(entry.value().clone())
    }

    /// Snapshot of every task; order is unspecified.
    pub fn list(&self) -> Vec<GenerationTask> {
        self.tasks.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn count_by_status(&self, status: TaskStatus) -> usize {
        self.tasks
            .iter()
            .filter(|entry| entry.value().status() == status)
            .count()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
