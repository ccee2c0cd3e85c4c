//! Compute backends
//!
//! A [`ComputeBackend`] turns an input image and generation parameters into the
//! three artifact payloads. Every outcome, including failure, is reported as a
//! [`BackendResult`].

pub mod factory;
pub mod local;
pub mod remote;

pub use factory::{build_backend, build_selector, BackendKind, BackendsConfig};
pub use local::{
    GenerationPipeline, LocalBackendConfig, LocalPipelineBackend, PipelineKind, PipelineOutput,
    PlaceholderPipeline,
};
pub use remote::RemoteJobBackend;

use crate::error::BackendError;
use crate::types::{ArtifactPayloads, GenerationParameters, TaskId};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a backend needs for one generation attempt.
#[derive(Debug, Clone)]
pub struct GenerationInput {
    pub task_id: TaskId,
    pub image: Arc<[u8]>,
    pub parameters: GenerationParameters,
    /// Cooperative cancellation; backends check it at their suspension points.
    pub cancel: CancellationToken,
}

impl GenerationInput {
    pub fn new(task_id: TaskId, image: impl Into<Arc<[u8]>>, parameters: GenerationParameters) -> Self {
        Self {
            task_id,
            image: image.into(),
            parameters,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Outcome of one backend attempt.
///
/// Either carries all three payloads (success) or an error (failure), never both.
#[derive(Clone, PartialEq)]
pub struct BackendResult {
    backend: String,
    artifacts: Option<ArtifactPayloads>,
    authentic: bool,
    error: Option<BackendError>,
}

impl BackendResult {
    pub fn success(backend: impl Into<String>, artifacts: ArtifactPayloads, authentic: bool) -> Self {
        Self {
            backend: backend.into(),
            artifacts: Some(artifacts),
            authentic,
            error: None,
        }
    }

    pub fn failure(backend: impl Into<String>, error: BackendError) -> Self {
        Self {
            backend: backend.into(),
            artifacts: None,
            authentic: false,
            error: Some(error),
        }
    }

    /// Name of the backend that produced this result.
    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn artifacts(&self) -> Option<&ArtifactPayloads> {
        self.artifacts.as_ref()
    }

    pub fn authentic(&self) -> bool {
        self.authentic
    }

    pub fn error(&self) -> Option<&BackendError> {
        self.error.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub(crate) fn with_authentic(mut self, authentic: bool) -> Self {
        if self.artifacts.is_some() {
            self.authentic = authentic;
        }
        self
    }

    /// Hand the payloads over to the caller, or the error on failure.
    pub fn into_outcome(self) -> Result<ArtifactPayloads, BackendError> {
        match (self.artifacts, self.error) {
            (_, Some(error)) => Err(error),
            (Some(artifacts), None) => Ok(artifacts),
            (None, None) => Err(BackendError::Failure(format!(
                "Backend {} returned no artifacts",
                self.backend
            ))),
        }
    }
}

impl fmt::Debug for BackendResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendResult")
            .field("backend", &self.backend)
            .field(
                "artifact_bytes",
                &self.artifacts.as_ref().map(|a| {
                    (a.scene.len(), a.point_cloud.len(), a.preview.len())
                }),
            )
            .field("authentic", &self.authentic)
            .field("error", &self.error)
            .finish()
    }
}

/// Capability that performs the actual image-to-3D generation.
///
/// `generate` may take minutes; callers run it off the path that answers status
/// queries.
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, input: &GenerationInput) -> BackendResult;
}
