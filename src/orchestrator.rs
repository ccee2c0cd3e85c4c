//! Generation orchestrator
//!
//! Accepts generation requests, runs each one as a background unit of work, and
//! answers status and artifact queries from the [`TaskRegistry`] without ever
//! touching a backend.
//!
//! Concurrency is bounded by a semaphore of `max_concurrent_generations` permits.
//! Requests beyond the limit are either queued (the task stays Pending until a
//! permit frees up) or rejected with [`OrchestratorError::AtCapacity`].

use crate::artifact::{ArtifactStore, FsArtifactStore, FsInputStore, InputStore};
use crate::backend::{build_selector, GenerationInput};
use crate::config::SculptConfig;
use crate::error::{OrchestratorError, StorageError};
use crate::fallback::FallbackSelector;
use crate::registry::TaskRegistry;
use crate::task::{TaskFailure, TaskMutation, TaskStatus, TaskView};
use crate::types::{ArtifactKind, GenerationParameters, TaskId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// How `start` behaves when every generation slot is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPolicy {
    /// Register the task and run it when a slot frees up.
    #[default]
    Queue,
    /// Refuse the request.
    Reject,
}

/// `[orchestrator]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_concurrent_generations")]
    pub max_concurrent_generations: usize,

    #[serde(default)]
    pub admission: AdmissionPolicy,

    /// Registry polling interval of [`GenerationOrchestrator::wait_for_terminal`].
    #[serde(default = "default_wait_poll_interval_ms")]
    pub wait_poll_interval_ms: u64,
}

fn default_max_concurrent_generations() -> usize {
    3
}

fn default_wait_poll_interval_ms() -> u64 {
    100
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_generations: default_max_concurrent_generations(),
            admission: AdmissionPolicy::default(),
            wait_poll_interval_ms: default_wait_poll_interval_ms(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_generations == 0 {
            return Err("max_concurrent_generations must be at least 1".to_string());
        }
        if self.wait_poll_interval_ms == 0 {
            return Err("wait_poll_interval_ms must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Task counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrchestratorStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub available_slots: usize,
}

struct OrchestratorInner {
    config: OrchestratorConfig,
    registry: TaskRegistry,
    selector: FallbackSelector,
    artifacts: Arc<dyn ArtifactStore>,
    inputs: Arc<dyn InputStore>,
    admission: Arc<Semaphore>,
    cancellations: DashMap<TaskId, CancellationToken>,
    /// Ids claimed by a `start` call that has not registered its task yet.
    reservations: DashMap<TaskId, ()>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

/// Top-level coordinator of generation tasks. Cheap to clone.
#[derive(Clone)]
pub struct GenerationOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl GenerationOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        selector: FallbackSelector,
        artifacts: Arc<dyn ArtifactStore>,
        inputs: Arc<dyn InputStore>,
    ) -> Self {
        let permits = config.max_concurrent_generations.max(1);
        Self {
            inner: Arc::new(OrchestratorInner {
                config,
                registry: TaskRegistry::new(),
                selector,
                artifacts,
                inputs,
                admission: Arc::new(Semaphore::new(permits)),
                cancellations: DashMap::new(),
                reservations: DashMap::new(),
                shutdown: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Build the stores and backends described by `config`.
    pub fn from_config(config: &SculptConfig) -> Result<Self, OrchestratorError> {
        let selector = build_selector(&config.backends, &config.authenticity)
            .map_err(|e| OrchestratorError::ConfigError(e.to_string()))?;
        let artifacts = FsArtifactStore::new(&config.storage.artifact_dir)?;
        let inputs = FsInputStore::new(&config.storage.input_dir)?;
        Ok(Self::new(
            config.orchestrator.clone(),
            selector,
            Arc::new(artifacts),
            Arc::new(inputs),
        ))
    }

    /// Register a task and hand it to a background unit of work.
    ///
    /// When the call returns the task is visible to `status` and is Pending or
    /// Processing.
    pub async fn start(
        &self,
        id: TaskId,
        image: Vec<u8>,
        parameters: GenerationParameters,
    ) -> Result<TaskView, OrchestratorError> {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return Err(OrchestratorError::ShuttingDown);
        }
        parameters
            .validate()
            .map_err(OrchestratorError::InvalidParameters)?;
        // Held until the task is registered, so a concurrent duplicate never
        // reaches the input store.
        let _reservation = Reservation::claim(inner, &id)?;

        let permit = match Arc::clone(&inner.admission).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) if inner.config.admission == AdmissionPolicy::Reject => {
                warn!(
                    task_id = %id,
                    limit = inner.config.max_concurrent_generations,
                    "Generation rejected, orchestrator at capacity"
                );
                return Err(OrchestratorError::AtCapacity {
                    limit: inner.config.max_concurrent_generations,
                });
            }
            Err(_) => None,
        };

        let image: Arc<[u8]> = Arc::from(image);
        let input = {
            let store = Arc::clone(&inner.inputs);
            let image = Arc::clone(&image);
            let task_id = id.clone();
            tokio::task::spawn_blocking(move || store.persist(&task_id, &image))
                .await
                .map_err(|e| {
                    StorageError::IoError(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("Input persistence aborted: {}", e),
                    ))
                })??
        };

        let task = inner.registry.create(id.clone(), parameters, input)?;
        info!(
            task_id = %id,
            seed = parameters.seed,
            queued = permit.is_none(),
            "Generation task created"
        );

        let view = if permit.is_some() {
            inner.registry.update(&id, TaskMutation::Dispatch)?.view()
        } else {
            task.view()
        };

        // A cancel racing with this call may already have inserted the token.
        let cancel = inner
            .cancellations
            .entry(id.clone())
            .or_insert_with(|| inner.shutdown.child_token())
            .clone();

        let worker = Arc::clone(inner);
        inner
            .tracker
            .spawn(run_task(worker, id, image, parameters, permit, cancel));

        Ok(view)
    }

    pub fn status(&self, id: &TaskId) -> Result<TaskView, OrchestratorError> {
        self.inner
            .registry
            .get(id)
            .map(|task| task.view())
            .ok_or_else(|| OrchestratorError::NotFound(id.clone()))
    }

    /// Persisted bytes of one artifact of a Completed task.
    pub async fn artifact(&self, id: &TaskId, kind: ArtifactKind) -> Result<Vec<u8>, OrchestratorError> {
        let task = self
            .inner
            .registry
            .get(id)
            .ok_or_else(|| OrchestratorError::NotFound(id.clone()))?;
        let locator = match task.artifacts() {
            Some(locators) => locators.get(kind).clone(),
            None => {
                return Err(OrchestratorError::NotReady {
                    task_id: id.clone(),
                    kind,
                    status: task.status(),
                })
            }
        };

        let store = Arc::clone(&self.inner.artifacts);
        let bytes = tokio::task::spawn_blocking(move || store.read(&locator))
            .await
            .map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Artifact read aborted: {}", e),
                ))
            })??;

        bytes.ok_or_else(|| OrchestratorError::ArtifactMissing {
            task_id: id.clone(),
            kind,
        })
    }

    /// Signal cancellation. Returns `false` if the task had already finished.
    pub fn cancel(&self, id: &TaskId) -> Result<bool, OrchestratorError> {
        let inner = &self.inner;
        let task = inner
            .registry
            .get(id)
            .ok_or_else(|| OrchestratorError::NotFound(id.clone()))?;
        if task.status().is_terminal() {
            return Ok(false);
        }

        inner
            .cancellations
            .entry(id.clone())
            .or_insert_with(|| inner.shutdown.child_token())
            .cancel();

        // The unit of work may have finished between the status read and the
        // signal. Its token is gone then, so drop the one inserted above.
        let current = self.status(id)?.status;
        if current.is_terminal() {
            inner.cancellations.remove(id);
            if current != TaskStatus::Cancelled {
                debug!(task_id = %id, status = %current, "Cancellation arrived after task finished");
                return Ok(false);
            }
        }
        info!(task_id = %id, status = %task.status(), "Cancellation requested");
        Ok(true)
    }

    pub fn list(&self) -> Vec<TaskView> {
        self.inner
            .registry
            .list()
            .iter()
            .map(|task| task.view())
            .collect()
    }

    pub fn stats(&self) -> OrchestratorStats {
        let registry = &self.inner.registry;
        OrchestratorStats {
            pending: registry.count_by_status(TaskStatus::Pending),
            processing: registry.count_by_status(TaskStatus::Processing),
            completed: registry.count_by_status(TaskStatus::Completed),
            failed: registry.count_by_status(TaskStatus::Failed),
            cancelled: registry.count_by_status(TaskStatus::Cancelled),
            available_slots: self.inner.admission.available_permits(),
        }
    }

    /// Poll the registry until the task is terminal or `timeout` elapses.
    pub async fn wait_for_terminal(
        &self,
        id: &TaskId,
        timeout: Duration,
    ) -> Result<TaskView, OrchestratorError> {
        let started = Instant::now();
        let interval = Duration::from_millis(self.inner.config.wait_poll_interval_ms.max(1));
        loop {
            let view = self.status(id)?;
            if view.status.is_terminal() {
                return Ok(view);
            }
            if started.elapsed() >= timeout {
                return Err(OrchestratorError::WaitTimeout(id.clone()));
            }
            sleep(interval).await;
        }
    }

    /// Cancel every outstanding task and wait for all background work to end.
    pub async fn shutdown(&self) {
        info!(active = self.inner.tracker.len(), "Shutting down orchestrator");
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }
}

/// Background unit of work for one task. The only writer of that task's record
/// after creation.
async fn run_task(
    inner: Arc<OrchestratorInner>,
    id: TaskId,
    image: Arc<[u8]>,
    parameters: GenerationParameters,
    permit: Option<OwnedSemaphorePermit>,
    cancel: CancellationToken,
) {
    let _permit = match permit {
        Some(permit) => permit,
        None => match wait_for_slot(&inner, &id, &cancel).await {
            Some(permit) => permit,
            None => {
                inner.cancellations.remove(&id);
                return;
            }
        },
    };

    let started = Instant::now();
    let input = GenerationInput {
        task_id: id.clone(),
        image,
        parameters,
        cancel: cancel.clone(),
    };

    let outcome = AssertUnwindSafe(inner.selector.generate(&input))
        .catch_unwind()
        .await;

    let mutation = match outcome {
        Err(_) => TaskMutation::Fail(TaskFailure::new(
            "Unexpected fault during generation",
            "internal_error",
        )),
        Ok(_) if cancel.is_cancelled() => TaskMutation::Cancel,
        Ok(result) => {
            let backend = result.backend().to_string();
            let authentic = result.authentic();
            match result.into_outcome() {
                Err(e) if e.is_cancelled() => TaskMutation::Cancel,
                Err(e) => TaskMutation::Fail(TaskFailure::from(&e)),
                Ok(payloads) if payloads.iter().any(|(_, bytes)| bytes.is_empty()) => {
                    let empty: Vec<&str> = payloads
                        .iter()
                        .filter(|(_, bytes)| bytes.is_empty())
                        .map(|(kind, _)| kind.as_str())
                        .collect();
                    TaskMutation::Fail(TaskFailure::new(
                        format!("Backend {} returned empty artifacts: {}", backend, empty.join(", ")),
                        "backend_failure",
                    ))
                }
                Ok(payloads) => {
                    debug!(task_id = %id, backend = %backend, authentic, "Persisting artifacts");
                    let store = Arc::clone(&inner.artifacts);
                    let task_id = id.clone();
                    match tokio::task::spawn_blocking(move || store.persist_all(&task_id, &payloads)).await {
                        Ok(Ok(locators)) => TaskMutation::Complete(locators),
                        Ok(Err(e)) => TaskMutation::Fail(TaskFailure::new(
                            format!("Failed to persist artifacts: {}", e),
                            "storage_error",
                        )),
                        Err(e) => TaskMutation::Fail(TaskFailure::new(
                            format!("Artifact persistence aborted: {}", e),
                            "internal_error",
                        )),
                    }
                }
            }
        }
    };

    record(&inner, &id, mutation, started.elapsed());
    inner.cancellations.remove(&id);
}

/// Claim on a task id between the duplicate check and registration.
struct Reservation<'a> {
    reservations: &'a DashMap<TaskId, ()>,
    id: TaskId,
}

impl<'a> Reservation<'a> {
    fn claim(inner: &'a OrchestratorInner, id: &TaskId) -> Result<Self, OrchestratorError> {
        match inner.reservations.entry(id.clone()) {
            Entry::Occupied(_) => return Err(OrchestratorError::AlreadyExists(id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(());
            }
        }
        let reservation = Self {
            reservations: &inner.reservations,
            id: id.clone(),
        };
        if inner.registry.contains(id) {
            return Err(OrchestratorError::AlreadyExists(id.clone()));
        }
        Ok(reservation)
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.reservations.remove(&self.id);
    }
}

/// Wait for a generation slot while the task sits in Pending.
async fn wait_for_slot(
    inner: &Arc<OrchestratorInner>,
    id: &TaskId,
    cancel: &CancellationToken,
) -> Option<OwnedSemaphorePermit> {
    let acquired = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        permit = Arc::clone(&inner.admission).acquire_owned() => permit.ok(),
    };

    match acquired {
        Some(permit) => match inner.registry.update(id, TaskMutation::Dispatch) {
            Ok(_) => {
                debug!(task_id = %id, "Queued task dispatched");
                Some(permit)
            }
            Err(e) => {
                error!(task_id = %id, error = %e, "Failed to dispatch queued task");
                None
            }
        },
        None => {
            let mutation = if cancel.is_cancelled() {
                TaskMutation::Cancel
            } else {
                TaskMutation::Fail(TaskFailure::new(
                    "Generation slots are no longer available",
                    "internal_error",
                ))
            };
            record(inner, id, mutation, Duration::ZERO);
            None
        }
    }
}

fn record(inner: &OrchestratorInner, id: &TaskId, mutation: TaskMutation, elapsed: Duration) {
    let completed_locators = match &mutation {
        TaskMutation::Complete(locators) => Some(locators.clone()),
        _ => None,
    };

    match inner.registry.update(id, mutation) {
        Ok(task) => {
            let duration_ms = elapsed.as_millis() as u64;
            match (task.status(), task.error()) {
                (TaskStatus::Failed, Some(failure)) => warn!(
                    task_id = %id,
                    duration_ms,
                    code = %failure.code,
                    error = %failure.message,
                    "Generation failed"
                ),
                (status, _) => info!(task_id = %id, duration_ms, status = %status, "Generation finished"),
            }
        }
        Err(e) => {
            error!(task_id = %id, error = %e, "Failed to record task outcome");
            if let Some(locators) = completed_locators {
                let all: Vec<_> = locators.iter().map(|(_, l)| l.clone()).collect();
                inner.artifacts.cleanup(&all);
            }
        }
    }
}
