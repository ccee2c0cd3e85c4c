//! Shared test utilities for integration tests
//!
//! Fake pipelines, orchestrator builders and environment isolation.

use sculpt::artifact::{FsArtifactStore, FsInputStore};
use sculpt::backend::{ComputeBackend, GenerationPipeline, LocalPipelineBackend, PipelineOutput};
use sculpt::fallback::{AuthenticityPolicy, FallbackSelector};
use sculpt::orchestrator::{GenerationOrchestrator, OrchestratorConfig};
use sculpt::types::{ArtifactSet, GenerationParameters};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tempfile::TempDir;

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: Mutex<()> = Mutex::new(());

pub fn lock_env() -> MutexGuard<'static, ()> {
    ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
}

/// Run `f` with XDG_CONFIG_HOME pointed at an empty temp dir, restoring it afterwards.
pub fn with_isolated_config_home<F, R>(f: F) -> R
where
    F: FnOnce(&std::path::Path) -> R,
{
    let _guard = lock_env();
    let original = std::env::var("XDG_CONFIG_HOME").ok();
    let temp = TempDir::new().unwrap();
    std::env::set_var("XDG_CONFIG_HOME", temp.path());

    let result = f(temp.path());

    match original {
        Some(value) => std::env::set_var("XDG_CONFIG_HOME", value),
        None => std::env::remove_var("XDG_CONFIG_HOME"),
    }
    result
}

/// Pipeline producing large, distinct payloads that pass the authenticity check.
pub struct RealisticPipeline {
    pub latency: Duration,
}

impl RealisticPipeline {
    pub fn payloads(seed: u64) -> ArtifactSet<Vec<u8>> {
        let fill = |tag: u8, len: usize| {
            (0..len)
                .map(|i| tag.wrapping_add((i as u64 ^ seed) as u8))
                .collect::<Vec<u8>>()
        };
        ArtifactSet::new(fill(1, 4096), fill(2, 2048), fill(3, 1024))
    }
}

impl GenerationPipeline for RealisticPipeline {
    fn run(
        &self,
        _image: &[u8],
        parameters: &GenerationParameters,
    ) -> anyhow::Result<PipelineOutput> {
        std::thread::sleep(self.latency);
        Ok(PipelineOutput {
            artifacts: Self::payloads(parameters.seed),
            authentic: true,
        })
    }
}

/// Pipeline that always errors.
pub struct FailingPipeline(pub &'static str);

impl GenerationPipeline for FailingPipeline {
    fn run(&self, _image: &[u8], _parameters: &GenerationParameters) -> anyhow::Result<PipelineOutput> {
        Err(anyhow::anyhow!(self.0))
    }
}

pub fn local_backend(pipeline: impl GenerationPipeline) -> Arc<dyn ComputeBackend> {
    Arc::new(LocalPipelineBackend::new(Arc::new(pipeline), 4))
}

/// Orchestrator over temp-dir stores. The TempDir must outlive the orchestrator.
pub fn orchestrator_with(
    selector: FallbackSelector,
    config: OrchestratorConfig,
) -> (GenerationOrchestrator, TempDir) {
    let temp = TempDir::new().unwrap();
    let artifacts = FsArtifactStore::new(temp.path().join("outputs")).unwrap();
    let inputs = FsInputStore::new(temp.path().join("outputs/inputs")).unwrap();
    let orchestrator =
        GenerationOrchestrator::new(config, selector, Arc::new(artifacts), Arc::new(inputs));
    (orchestrator, temp)
}

pub fn realistic_orchestrator(latency: Duration) -> (GenerationOrchestrator, TempDir) {
    let selector = FallbackSelector::new(local_backend(RealisticPipeline { latency }))
        .with_authenticity(AuthenticityPolicy::default());
    orchestrator_with(selector, OrchestratorConfig::default())
}

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDRfake";
