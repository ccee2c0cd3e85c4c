//! End-to-end task lifecycle through the orchestrator.

use crate::integration::test_utils::{
    local_backend, orchestrator_with, realistic_orchestrator, FailingPipeline, RealisticPipeline,
    PNG_BYTES,
};
use sculpt::backend::RemoteJobBackend;
use sculpt::error::OrchestratorError;
use sculpt::fallback::FallbackSelector;
use sculpt::orchestrator::{AdmissionPolicy, OrchestratorConfig};
use sculpt::remote::RemoteClientConfig;
use sculpt::task::TaskStatus;
use sculpt::types::{ArtifactKind, GenerationParameters, TaskId};
use std::sync::Arc;
use std::time::Duration;

fn id(raw: &str) -> TaskId {
    TaskId::parse(raw).unwrap()
}

#[tokio::test]
async fn test_successful_generation_produces_three_artifacts() {
    let (orchestrator, temp) = realistic_orchestrator(Duration::from_millis(20));
    let params = GenerationParameters {
        seed: 7,
        ..GenerationParameters::default()
    };

    let started = orchestrator
        .start(id("chair"), PNG_BYTES.to_vec(), params)
        .await
        .unwrap();
    assert!(matches!(
        started.status,
        TaskStatus::Pending | TaskStatus::Processing
    ));

    let done = orchestrator
        .wait_for_terminal(&id("chair"), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert!(done.error.is_none());
    assert_eq!(done.parameters.seed, 7);
    assert!(done.timestamps.completed.is_some());

    let expected = RealisticPipeline::payloads(7);
    for kind in ArtifactKind::ALL {
        let bytes = orchestrator.artifact(&id("chair"), kind).await.unwrap();
        assert_eq!(&bytes, expected.get(kind));
        // Re-reading yields identical bytes.
        assert_eq!(bytes, orchestrator.artifact(&id("chair"), kind).await.unwrap());
    }

    assert!(temp.path().join("outputs/chair.glb").exists());
    assert!(temp.path().join("outputs/inputs/chair_input.png").exists());
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_status_is_idempotent_once_terminal() {
    let (orchestrator, _temp) = realistic_orchestrator(Duration::ZERO);
    orchestrator
        .start(id("idem"), PNG_BYTES.to_vec(), GenerationParameters::default())
        .await
        .unwrap();
    let done = orchestrator
        .wait_for_terminal(&id("idem"), Duration::from_secs(5))
        .await
        .unwrap();

    for _ in 0..3 {
        assert_eq!(orchestrator.status(&id("idem")).unwrap(), done);
    }
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let (orchestrator, _temp) = realistic_orchestrator(Duration::ZERO);
    assert!(matches!(
        orchestrator.status(&id("ghost")),
        Err(OrchestratorError::NotFound(_))
    ));
    assert!(matches!(
        orchestrator.artifact(&id("ghost"), ArtifactKind::Scene).await,
        Err(OrchestratorError::NotFound(_))
    ));
    assert!(matches!(
        orchestrator.cancel(&id("ghost")),
        Err(OrchestratorError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_duplicate_start_is_rejected() {
    let (orchestrator, _temp) = realistic_orchestrator(Duration::from_millis(200));
    orchestrator
        .start(id("dup"), PNG_BYTES.to_vec(), GenerationParameters::default())
        .await
        .unwrap();
    let err = orchestrator
        .start(id("dup"), PNG_BYTES.to_vec(), GenerationParameters::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::AlreadyExists(_)));
    assert_eq!(orchestrator.list().len(), 1);
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_artifact_not_ready_while_running() {
    let (orchestrator, _temp) = realistic_orchestrator(Duration::from_millis(300));
    orchestrator
        .start(id("slow"), PNG_BYTES.to_vec(), GenerationParameters::default())
        .await
        .unwrap();

    let err = orchestrator
        .artifact(&id("slow"), ArtifactKind::Preview)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NotReady { .. }));
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_pipeline_error_fails_task() {
    let selector = FallbackSelector::new(local_backend(FailingPipeline("CUDA out of memory")));
    let (orchestrator, _temp) = orchestrator_with(selector, OrchestratorConfig::default());
    orchestrator
        .start(id("oom"), PNG_BYTES.to_vec(), GenerationParameters::default())
        .await
        .unwrap();

    let done = orchestrator
        .wait_for_terminal(&id("oom"), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(done.status, TaskStatus::Failed);
    let error = done.error.unwrap();
    assert_eq!(error.code, "pipeline_error");
    assert!(error.message.contains("CUDA out of memory"));
    assert!(done.artifacts.is_none());

    let err = orchestrator
        .artifact(&id("oom"), ArtifactKind::Scene)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::NotReady {
            status: TaskStatus::Failed,
            ..
        }
    ));
}

#[tokio::test]
async fn test_reject_admission_at_capacity() {
    let selector = FallbackSelector::new(local_backend(RealisticPipeline {
        latency: Duration::from_millis(300),
    }));
    let config = OrchestratorConfig {
        max_concurrent_generations: 1,
        admission: AdmissionPolicy::Reject,
        ..OrchestratorConfig::default()
    };
    let (orchestrator, _temp) = orchestrator_with(selector, config);

    orchestrator
        .start(id("first"), PNG_BYTES.to_vec(), GenerationParameters::default())
        .await
        .unwrap();
    let err = orchestrator
        .start(id("second"), PNG_BYTES.to_vec(), GenerationParameters::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::AtCapacity { limit: 1 }));
    assert!(orchestrator.status(&id("second")).is_err());
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_queued_tasks_all_complete() {
    let selector = FallbackSelector::new(local_backend(RealisticPipeline {
        latency: Duration::from_millis(30),
    }));
    let config = OrchestratorConfig {
        max_concurrent_generations: 2,
        ..OrchestratorConfig::default()
    };
    let (orchestrator, _temp) = orchestrator_with(selector, config);

    let ids: Vec<TaskId> = (0..5).map(|i| id(&format!("batch-{}", i))).collect();
    for task_id in &ids {
        orchestrator
            .start(task_id.clone(), PNG_BYTES.to_vec(), GenerationParameters::default())
            .await
            .unwrap();
    }
    for task_id in &ids {
        let done = orchestrator
            .wait_for_terminal(task_id, Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
    }

    orchestrator.shutdown().await;
    let stats = orchestrator.stats();
    assert_eq!(stats.completed, 5);
    assert_eq!(stats.pending + stats.processing, 0);
    assert_eq!(stats.available_slots, 2);
}

#[tokio::test]
async fn test_remote_failure_surfaces_provider_message() {
    let mut server = mockito::Server::new_async().await;
    let _submit = server
        .mock("POST", "/run")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"job-9","status":"IN_QUEUE"}"#)
        .create_async()
        .await;
    let _status = server
        .mock("GET", "/status/job-9")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"job-9","status":"FAILED","error":"bad image"}"#)
        .create_async()
        .await;

    let remote = RemoteJobBackend::from_config(RemoteClientConfig {
        poll_interval_ms: 10,
        ..RemoteClientConfig::with_endpoint(server.url())
    })
    .unwrap();
    let selector = FallbackSelector::new(Arc::new(remote));
    let (orchestrator, _temp) = orchestrator_with(selector, OrchestratorConfig::default());

    orchestrator
        .start(id("remote-bad"), PNG_BYTES.to_vec(), GenerationParameters::default())
        .await
        .unwrap();
    let done = orchestrator
        .wait_for_terminal(&id("remote-bad"), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(done.status, TaskStatus::Failed);
    let error = done.error.unwrap();
    assert_eq!(error.message, "bad image");
    assert_eq!(error.code, "backend_failure");
}

#[tokio::test]
async fn test_remote_empty_payload_fails_task() {
    let mut server = mockito::Server::new_async().await;
    let _submit = server
        .mock("POST", "/run")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"job-7","status":"IN_QUEUE"}"#)
        .create_async()
        .await;
    let _status = server
        .mock("GET", "/status/job-7")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"id":"job-7","status":"COMPLETED","output":{"glb_path_base64":"AAAA","ply_path_base64":"AAAA","preview_path_base64":""}}"#,
        )
        .create_async()
        .await;

    let remote = RemoteJobBackend::from_config(RemoteClientConfig {
        poll_interval_ms: 10,
        ..RemoteClientConfig::with_endpoint(server.url())
    })
    .unwrap();
    let selector = FallbackSelector::new(Arc::new(remote));
    let (orchestrator, temp) = orchestrator_with(selector, OrchestratorConfig::default());

    orchestrator
        .start(id("remote-empty"), PNG_BYTES.to_vec(), GenerationParameters::default())
        .await
        .unwrap();
    let done = orchestrator
        .wait_for_terminal(&id("remote-empty"), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(done.status, TaskStatus::Failed);
    let error = done.error.unwrap();
    assert_eq!(error.code, "backend_failure");
    assert!(error.message.contains("preview_path_base64"));
    assert!(matches!(
        orchestrator.artifact(&id("remote-empty"), ArtifactKind::Preview).await,
        Err(OrchestratorError::NotReady { .. })
    ));
    assert!(!temp.path().join("outputs").join("remote-empty.mp4").exists());
}

#[tokio::test]
async fn test_cancel_running_task() {
    let (orchestrator, _temp) = realistic_orchestrator(Duration::from_millis(200));
    orchestrator
        .start(id("stop-me"), PNG_BYTES.to_vec(), GenerationParameters::default())
        .await
        .unwrap();

    assert!(orchestrator.cancel(&id("stop-me")).unwrap());
    let done = orchestrator
        .wait_for_terminal(&id("stop-me"), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(done.status, TaskStatus::Cancelled);
    assert!(done.artifacts.is_none());
    assert!(!orchestrator.cancel(&id("stop-me")).unwrap());
}

#[tokio::test]
async fn test_invalid_parameters_are_rejected_before_registration() {
    let (orchestrator, _temp) = realistic_orchestrator(Duration::ZERO);
    let params = GenerationParameters {
        ss_sampling_steps: 0,
        ..GenerationParameters::default()
    };
    let err = orchestrator
        .start(id("bad-params"), PNG_BYTES.to_vec(), params)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidParameters(_)));
    assert!(orchestrator.list().is_empty());
}
