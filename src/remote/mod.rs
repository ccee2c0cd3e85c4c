//! Remote job client
//!
//! Submits generation jobs to a remote compute provider and polls them to a
//! terminal state. Polling is bounded three ways: an attempt budget, an optional
//! wall-clock deadline, and a per-task cancellation token checked before every
//! poll and while sleeping between polls.

pub mod wire;

use crate::backend::BackendResult;
use crate::error::BackendError;
use crate::types::{GenerationParameters, TaskId};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wire::{decode_output, JobResponse, JobStatus, SubmitRequest};

pub const REMOTE_BACKEND_NAME: &str = "remote";

/// Connection and polling settings for the remote provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteClientConfig {
    /// Base URL; `/run` and `/status/{id}` are appended.
    #[serde(default)]
    pub endpoint: String,

    /// Sent as a bearer token when set.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wall-clock bound on the poll loop; `None` relies on `max_attempts` only.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: Option<u64>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Consecutive poll errors tolerated before the job is reported failed.
    #[serde(default = "default_max_poll_errors")]
    pub max_poll_errors: u32,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    300
}

fn default_timeout_secs() -> Option<u64> {
    Some(300)
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_poll_errors() -> u32 {
    3
}

impl Default for RemoteClientConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_poll_errors: default_max_poll_errors(),
        }
    }
}

impl RemoteClientConfig {
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.endpoint.trim().is_empty() {
            return Err("endpoint is required".to_string());
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(format!("endpoint must be an http(s) URL: {}", self.endpoint));
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.max_poll_errors == 0 {
            return Err("max_poll_errors must be at least 1".to_string());
        }
        if self.timeout_secs == Some(0) {
            return Err("timeout_secs must be positive when set".to_string());
        }
        Ok(())
    }
}

/// An outstanding submission on the remote provider.
#[derive(Debug, Clone)]
pub struct RemoteJob {
    pub job_id: String,
    pub correlation_id: TaskId,
    pub poll_count: u32,
    pub deadline: Option<Instant>,
    /// Set when the submit response was already terminal.
    resolved: Option<JobResponse>,
}

/// HTTP client for the remote provider's submit/poll protocol.
pub struct RemoteJobClient {
    client: Client,
    endpoint: String,
    config: RemoteClientConfig,
}

impl RemoteJobClient {
    pub fn new(config: RemoteClientConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BackendError::Failure(format!("Failed to create HTTP client: {}", e)))?;
        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    pub fn config(&self) -> &RemoteClientConfig {
        &self.config
    }

    /// Submit one job. Transport, auth, and HTTP errors are terminal; submission
    /// is never retried.
    pub async fn submit(
        &self,
        image: &[u8],
        correlation_id: &TaskId,
        parameters: &GenerationParameters,
    ) -> Result<RemoteJob, BackendError> {
        let url = format!("{}/run", self.endpoint);
        let body = SubmitRequest::new(image, correlation_id, parameters);

        let mut request = self.client.post(&url).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request.send().await.map_err(map_http_error)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(task_id = %correlation_id, status = %status, "Remote submission rejected");
            return Err(map_status_error(status, &text));
        }

        let parsed: JobResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Failure(format!("Invalid submit response: {}", e)))?;
        let job_id = parsed
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BackendError::Failure("Submit response missing job id".to_string()))?;

        info!(
            task_id = %correlation_id,
            job_id = %job_id,
            status = %parsed.status,
            "Remote job submitted"
        );

        let resolved = parsed.status().is_terminal().then_some(parsed);
        Ok(RemoteJob {
            job_id,
            correlation_id: correlation_id.clone(),
            poll_count: 0,
            deadline: self.config.timeout().map(|timeout| Instant::now() + timeout),
            resolved,
        })
    }

    /// Poll `job` until it reaches a terminal state, the attempt budget or
    /// deadline runs out, or `cancel` fires.
    pub async fn await_completion(&self, mut job: RemoteJob, cancel: &CancellationToken) -> BackendResult {
        if let Some(response) = job.resolved.take() {
            return self.resolve(&job, response);
        }

        let interval = self.config.poll_interval();
        let mut consecutive_errors = 0u32;

        while job.poll_count < self.config.max_attempts {
            if cancel.is_cancelled() {
                return self.cancelled(&job);
            }
            if job.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break;
            }

            job.poll_count += 1;
            let request = async {
                match job.deadline {
                    Some(deadline) => timeout_at(deadline, self.poll(&job)).await.ok(),
                    None => Some(self.poll(&job).await),
                }
            };
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(&job),
                polled = request => polled,
            };
            // The deadline passed while the status request was in flight.
            let Some(polled) = polled else {
                break;
            };

            match polled {
                Ok(response) => {
                    consecutive_errors = 0;
                    let status = response.status();
                    if status.is_terminal() {
                        return self.resolve(&job, response);
                    }
                    debug!(
                        task_id = %job.correlation_id,
                        job_id = %job.job_id,
                        attempt = job.poll_count,
                        status = %response.status,
                        "Remote job still running"
                    );
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(
                        task_id = %job.correlation_id,
                        job_id = %job.job_id,
                        attempt = job.poll_count,
                        consecutive_errors,
                        error = %e,
                        "Remote status poll failed"
                    );
                    if consecutive_errors >= self.config.max_poll_errors {
                        return BackendResult::failure(REMOTE_BACKEND_NAME, e);
                    }
                }
            }

            if job.poll_count >= self.config.max_attempts {
                break;
            }

            let wait = match job.deadline {
                Some(deadline) => interval.min(deadline.saturating_duration_since(Instant::now())),
                None => interval,
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(&job),
                _ = sleep(wait) => {}
            }
        }

        warn!(
            task_id = %job.correlation_id,
            job_id = %job.job_id,
            attempts = job.poll_count,
            "Remote job timed out"
        );
        BackendResult::failure(
            REMOTE_BACKEND_NAME,
            BackendError::Timeout {
                job_id: job.job_id.clone(),
                attempts: job.poll_count,
            },
        )
    }

    async fn poll(&self, job: &RemoteJob) -> Result<JobResponse, BackendError> {
        let url = format!("{}/status/{}", self.endpoint, job.job_id);
        let mut request = self.client.get(&url);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request.send().await.map_err(map_http_error)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &text));
        }
        response
            .json()
            .await
            .map_err(|e| BackendError::Failure(format!("Invalid status response: {}", e)))
    }

    fn resolve(&self, job: &RemoteJob, response: JobResponse) -> BackendResult {
        match response.status() {
            JobStatus::Completed => {
                let decoded = match response.output.as_ref() {
                    Some(output) => decode_output(output),
                    None => Err(BackendError::Failure(
                        "Remote job completed without output".to_string(),
                    )),
                };
                match decoded {
                    Ok(decoded) => {
                        info!(
                            task_id = %job.correlation_id,
                            job_id = %job.job_id,
                            polls = job.poll_count,
                            execution_time_ms = response.execution_time.unwrap_or_default(),
                            bytes = decoded.artifacts.total_len(),
                            "Remote job completed"
                        );
                        BackendResult::success(REMOTE_BACKEND_NAME, decoded.artifacts, decoded.authentic)
                    }
                    Err(e) => {
                        warn!(task_id = %job.correlation_id, job_id = %job.job_id, error = %e, "Remote output unusable");
                        BackendResult::failure(REMOTE_BACKEND_NAME, e)
                    }
                }
            }
            status => {
                let message = response.error_text().unwrap_or_else(|| match status {
                    JobStatus::Cancelled => "Remote job was cancelled by the provider".to_string(),
                    JobStatus::TimedOut => "Remote job timed out on the provider".to_string(),
                    _ => "Remote job failed".to_string(),
                });
                warn!(
                    task_id = %job.correlation_id,
                    job_id = %job.job_id,
                    status = %response.status,
                    error = %message,
                    "Remote job failed"
                );
                BackendResult::failure(REMOTE_BACKEND_NAME, BackendError::Failure(message))
            }
        }
    }

    fn cancelled(&self, job: &RemoteJob) -> BackendResult {
        info!(
            task_id = %job.correlation_id,
            job_id = %job.job_id,
            polls = job.poll_count,
            "Remote polling cancelled"
        );
        BackendResult::failure(REMOTE_BACKEND_NAME, BackendError::Cancelled)
    }
}

/// Map reqwest transport errors to backend failures.
fn map_http_error(error: reqwest::Error) -> BackendError {
    if error.is_timeout() {
        BackendError::Failure(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        BackendError::Failure(format!("Connection error: {}", error))
    } else {
        BackendError::Failure(format!("HTTP error: {}", error))
    }
}

fn map_status_error(status: StatusCode, body: &str) -> BackendError {
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body.trim())
    };
    match status.as_u16() {
        401 | 403 => BackendError::Failure(format!("Authentication failed ({})", detail)),
        429 => BackendError::Failure(format!("Rate limit exceeded ({})", detail)),
        _ => BackendError::Failure(format!("HTTP {}", detail)),
    }
}
