//! Remote provider wire types.
//!
//! Submit: `POST {endpoint}/run` with `{"input": {...}}`.
//! Poll: `GET {endpoint}/status/{job_id}`.

use crate::artifact::detect_image_format;
use crate::error::BackendError;
use crate::types::{ArtifactKind, ArtifactPayloads, ArtifactSet, GenerationParameters, TaskId};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct SubmitRequest<'a> {
    pub input: SubmitInput<'a>,
}

#[derive(Debug, Serialize)]
pub struct SubmitInput<'a> {
    pub image_data: String,
    pub image_format: &'static str,
    pub task_id: &'a str,
    pub parameters: &'a GenerationParameters,
}

impl<'a> SubmitRequest<'a> {
    /// `image_format` is taken from the image header; unrecognized images are
    /// sent as png, the provider's default.
    pub fn new(image: &[u8], task_id: &'a TaskId, parameters: &'a GenerationParameters) -> Self {
        Self {
            input: SubmitInput {
                image_data: STANDARD.encode(image),
                image_format: detect_image_format(image).unwrap_or("png"),
                task_id: task_id.as_str(),
                parameters,
            },
        }
    }
}

/// Body of both the submit and the status responses.
#[derive(Debug, Clone, Deserialize)]
pub struct JobResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default, rename = "executionTime")]
    pub execution_time: Option<f64>,
}

impl JobResponse {
    pub fn status(&self) -> JobStatus {
        JobStatus::parse(&self.status)
    }

    /// Provider error text, if any.
    pub fn error_text(&self) -> Option<String> {
        self.error.as_ref().and_then(value_text)
    }
}

/// Job status as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    InQueue,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
    /// Anything else; treated as still running.
    Unknown,
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "IN_QUEUE" | "QUEUED" => JobStatus::InQueue,
            "IN_PROGRESS" | "RUNNING" => JobStatus::InProgress,
            "COMPLETED" => JobStatus::Completed,
            "FAILED" => JobStatus::Failed,
            "CANCELLED" => JobStatus::Cancelled,
            "TIMED_OUT" => JobStatus::TimedOut,
            _ => JobStatus::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::TimedOut
        )
    }
}

/// Artifacts decoded from a completed job's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedOutput {
    pub artifacts: ArtifactPayloads,
    pub authentic: bool,
}

fn payload_key(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Scene => "glb_path_base64",
        ArtifactKind::PointCloud => "ply_path_base64",
        ArtifactKind::Preview => "preview_path_base64",
    }
}

/// Decode the `output` object of a COMPLETED job.
///
/// The artifact map is either nested under `result` or is the output itself. A
/// worker that caught its own exception reports `{"status": "failed", "error": ...}`
/// inside an otherwise completed job.
pub fn decode_output(output: &Value) -> Result<DecodedOutput, BackendError> {
    if output
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|status| status.eq_ignore_ascii_case("failed"))
    {
        let message = output
            .get("error")
            .and_then(value_text)
            .unwrap_or_else(|| "Remote generation failed".to_string());
        return Err(BackendError::Failure(message));
    }

    let result = output.get("result").filter(|v| v.is_object()).unwrap_or(output);
    let decode = |kind: ArtifactKind| -> Result<Vec<u8>, BackendError> {
        let key = payload_key(kind);
        let encoded = result
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::Failure(format!("Incomplete output: missing {}", key)))?;
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| BackendError::Failure(format!("Invalid base64 in {}: {}", key, e)))?;
        if bytes.is_empty() {
            return Err(BackendError::Failure(format!("Incomplete output: empty {}", key)));
        }
        Ok(bytes)
    };

    let artifacts = ArtifactSet::new(
        decode(ArtifactKind::Scene)?,
        decode(ArtifactKind::PointCloud)?,
        decode(ArtifactKind::Preview)?,
    );
    let authentic = output
        .get("authentic")
        .or_else(|| result.get("authentic"))
        .and_then(Value::as_bool)
        .unwrap_or(true);

    Ok(DecodedOutput {
        artifacts,
        authentic,
    })
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
