//! Primary/secondary selection driven through the orchestrator.

use crate::integration::test_utils::{
    local_backend, orchestrator_with, RealisticPipeline, PNG_BYTES,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sculpt::backend::{PlaceholderPipeline, RemoteJobBackend};
use sculpt::fallback::{AuthenticityPolicy, FallbackPolicy, FallbackSelector};
use sculpt::orchestrator::OrchestratorConfig;
use sculpt::remote::RemoteClientConfig;
use sculpt::task::TaskStatus;
use sculpt::types::{ArtifactKind, GenerationParameters, TaskId};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn id(raw: &str) -> TaskId {
    TaskId::parse(raw).unwrap()
}

async fn placeholder_provider() -> mockito::ServerGuard {
    let mut server = mockito::Server::new_async().await;
    let body = json!({
        "id": "job-p",
        "status": "COMPLETED",
        "output": {
            "glb_path_base64": STANDARD.encode(b"mock_glb_data"),
            "ply_path_base64": STANDARD.encode(b"mock_ply_data"),
            "preview_path_base64": STANDARD.encode(b"mock_video_data"),
        }
    });
    server
        .mock("POST", "/run")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await;
    server
}

fn remote(server: &mockito::ServerGuard) -> Arc<RemoteJobBackend> {
    Arc::new(RemoteJobBackend::from_config(RemoteClientConfig::with_endpoint(server.url())).unwrap())
}

#[tokio::test]
async fn test_placeholder_remote_falls_back_to_local() {
    let server = placeholder_provider().await;
    let selector = FallbackSelector::new(remote(&server))
        .with_secondary(local_backend(RealisticPipeline {
            latency: Duration::ZERO,
        }))
        .with_authenticity(AuthenticityPolicy::default());
    let (orchestrator, _temp) = orchestrator_with(selector, OrchestratorConfig::default());

    orchestrator
        .start(id("fb-1"), PNG_BYTES.to_vec(), GenerationParameters::default())
        .await
        .unwrap();
    let done = orchestrator
        .wait_for_terminal(&id("fb-1"), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(done.status, TaskStatus::Completed);

    let scene = orchestrator.artifact(&id("fb-1"), ArtifactKind::Scene).await.unwrap();
    assert_eq!(scene, RealisticPipeline::payloads(42).scene);
}

#[tokio::test]
async fn test_lenient_policy_keeps_placeholder_output() {
    let selector = FallbackSelector::new(local_backend(PlaceholderPipeline::default()))
        .with_policy(FallbackPolicy::Lenient);
    let (orchestrator, _temp) = orchestrator_with(selector, OrchestratorConfig::default());

    orchestrator
        .start(id("fb-2"), PNG_BYTES.to_vec(), GenerationParameters::default())
        .await
        .unwrap();
    let done = orchestrator
        .wait_for_terminal(&id("fb-2"), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    let ply = orchestrator
        .artifact(&id("fb-2"), ArtifactKind::PointCloud)
        .await
        .unwrap();
    assert!(ply.starts_with(b"ply"));
}

#[tokio::test]
async fn test_strict_policy_fails_without_authentic_output() {
    let server = placeholder_provider().await;
    let selector = FallbackSelector::new(remote(&server))
        .with_secondary(local_backend(PlaceholderPipeline::default()))
        .with_policy(FallbackPolicy::Strict);
    let (orchestrator, _temp) = orchestrator_with(selector, OrchestratorConfig::default());

    orchestrator
        .start(id("fb-3"), PNG_BYTES.to_vec(), GenerationParameters::default())
        .await
        .unwrap();
    let done = orchestrator
        .wait_for_terminal(&id("fb-3"), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.error.unwrap().code, "not_authentic");
    assert!(done.artifacts.is_none());
}

#[tokio::test]
async fn test_unreachable_remote_falls_back_to_local() {
    // Nothing listens on port 9 (discard) in the test environment.
    let remote = RemoteJobBackend::from_config(RemoteClientConfig {
        connect_timeout_secs: 1,
        request_timeout_secs: 1,
        ..RemoteClientConfig::with_endpoint("http://127.0.0.1:9")
    })
    .unwrap();
    let selector = FallbackSelector::new(Arc::new(remote)).with_secondary(local_backend(
        RealisticPipeline {
            latency: Duration::ZERO,
        },
    ));
    let (orchestrator, _temp) = orchestrator_with(selector, OrchestratorConfig::default());

    orchestrator
        .start(id("fb-4"), PNG_BYTES.to_vec(), GenerationParameters::default())
        .await
        .unwrap();
    let done = orchestrator
        .wait_for_terminal(&id("fb-4"), Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
}
