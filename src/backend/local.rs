//! In-process generation backend.
//!
//! Wraps an opaque [`GenerationPipeline`] and runs it on tokio's blocking pool.

use super::{BackendResult, ComputeBackend, GenerationInput};
use crate::error::BackendError;
use crate::types::{ArtifactKind, ArtifactPayloads, ArtifactSet, GenerationParameters};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

pub const LOCAL_BACKEND_NAME: &str = "local";

/// What a pipeline run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    pub artifacts: ArtifactPayloads,
    /// `false` when the pipeline knows it emitted placeholder content.
    pub authentic: bool,
}

/// The in-process image-to-3D capability. Runs synchronously and may block for
/// minutes.
pub trait GenerationPipeline: Send + Sync + 'static {
    fn run(&self, image: &[u8], parameters: &GenerationParameters) -> anyhow::Result<PipelineOutput>;
}

/// Backend that invokes a [`GenerationPipeline`] on the blocking pool.
pub struct LocalPipelineBackend {
    pipeline: Arc<dyn GenerationPipeline>,
    runs: Arc<Semaphore>,
}

impl LocalPipelineBackend {
    /// `max_concurrent_runs` bounds how many pipeline invocations execute at once.
    pub fn new(pipeline: Arc<dyn GenerationPipeline>, max_concurrent_runs: usize) -> Self {
        Self {
            pipeline,
            runs: Arc::new(Semaphore::new(max_concurrent_runs.max(1))),
        }
    }

    pub fn from_config(config: &LocalBackendConfig) -> Self {
        let pipeline: Arc<dyn GenerationPipeline> = match config.pipeline {
            PipelineKind::Placeholder => Arc::new(PlaceholderPipeline::new(Duration::from_millis(
                config.simulated_latency_ms,
            ))),
        };
        Self::new(pipeline, config.max_concurrent_runs)
    }
}

#[async_trait]
impl ComputeBackend for LocalPipelineBackend {
    fn name(&self) -> &str {
        LOCAL_BACKEND_NAME
    }

    async fn generate(&self, input: &GenerationInput) -> BackendResult {
        let permit = tokio::select! {
            biased;
            _ = input.cancel.cancelled() => {
                return BackendResult::failure(LOCAL_BACKEND_NAME, BackendError::Cancelled);
            }
            permit = Arc::clone(&self.runs).acquire_owned() => permit,
        };
        let permit = match permit {
            Ok(permit) => permit,
            Err(e) => {
                return BackendResult::failure(
                    LOCAL_BACKEND_NAME,
                    BackendError::Pipeline(format!("pipeline slot unavailable: {}", e)),
                )
            }
        };

        let pipeline = Arc::clone(&self.pipeline);
        let image = Arc::clone(&input.image);
        let parameters = input.parameters;
        let started = Instant::now();
        debug!(task_id = %input.task_id, "Running local pipeline");

        let joined = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            pipeline.run(&image, &parameters)
        })
        .await;

        let result = match joined {
            Ok(Ok(output)) => match empty_payload(&output.artifacts) {
                Some(kind) => BackendResult::failure(
                    LOCAL_BACKEND_NAME,
                    BackendError::Pipeline(format!("pipeline returned an empty {} payload", kind)),
                ),
                None => BackendResult::success(LOCAL_BACKEND_NAME, output.artifacts, output.authentic),
            },
            Ok(Err(e)) => {
                BackendResult::failure(LOCAL_BACKEND_NAME, BackendError::Pipeline(format!("{:#}", e)))
            }
            Err(e) if e.is_panic() => BackendResult::failure(
                LOCAL_BACKEND_NAME,
                BackendError::Pipeline(format!(
                    "pipeline panicked: {}",
                    panic_message(&*e.into_panic())
                )),
            ),
            Err(e) => BackendResult::failure(
                LOCAL_BACKEND_NAME,
                BackendError::Pipeline(format!("pipeline task aborted: {}", e)),
            ),
        };

        match result.error() {
            None => info!(
                task_id = %input.task_id,
                duration_ms = started.elapsed().as_millis() as u64,
                authentic = result.authentic(),
                "Local pipeline finished"
            ),
            Some(error) => warn!(
                task_id = %input.task_id,
                duration_ms = started.elapsed().as_millis() as u64,
                error = %error,
                "Local pipeline failed"
            ),
        }
        result
    }
}

fn empty_payload(artifacts: &ArtifactPayloads) -> Option<ArtifactKind> {
    artifacts
        .iter()
        .find(|(_, bytes)| bytes.is_empty())
        .map(|(kind, _)| kind)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Stand-in pipeline for environments without the real generation model.
///
/// Emits fixed placeholder payloads flagged as non-authentic, optionally after a
/// simulated delay.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderPipeline {
    latency: Duration,
}

const PLACEHOLDER_SCENE: &[u8] = b"mock_glb_data_for_demo_purposes";
const PLACEHOLDER_PREVIEW: &[u8] = b"mock_preview_data_for_demo_purposes";
const PLACEHOLDER_POINT_CLOUD: &str = "ply
format ascii 1.0
comment mock point cloud
element vertex 4
property float x
property float y
property float z
end_header
0.0 0.0 0.0
1.0 0.0 0.0
0.0 1.0 0.0
0.0 0.0 1.0
";

impl PlaceholderPipeline {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl GenerationPipeline for PlaceholderPipeline {
    fn run(&self, _image: &[u8], _parameters: &GenerationParameters) -> anyhow::Result<PipelineOutput> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        Ok(PipelineOutput {
            artifacts: ArtifactSet::new(
                PLACEHOLDER_SCENE.to_vec(),
                PLACEHOLDER_POINT_CLOUD.as_bytes().to_vec(),
                PLACEHOLDER_PREVIEW.to_vec(),
            ),
            authentic: false,
        })
    }
}

/// Which in-process pipeline to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    #[default]
    Placeholder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalBackendConfig {
    #[serde(default)]
    pub pipeline: PipelineKind,

    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,

    /// Delay added by the placeholder pipeline, in milliseconds.
    #[serde(default)]
    pub simulated_latency_ms: u64,
}

fn default_max_concurrent_runs() -> usize {
    1
}

impl Default for LocalBackendConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineKind::default(),
            max_concurrent_runs: default_max_concurrent_runs(),
            simulated_latency_ms: 0,
        }
    }
}

impl LocalBackendConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_runs == 0 {
            return Err("max_concurrent_runs must be at least 1".to_string());
        }
        Ok(())
    }
}
