//! Primary/secondary backend selection.
//!
//! [`FallbackSelector`] tries the primary backend, falls back to the secondary
//! when the primary fails or produces placeholder output, and decides per
//! [`FallbackPolicy`] what to return when nothing authentic was produced.

pub mod authenticity;

pub use authenticity::{AuthenticityConfig, AuthenticityPolicy, Verdict};

use crate::backend::{BackendResult, ComputeBackend, GenerationInput};
use crate::error::BackendError;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{info, warn};

/// What to do when every attempt produced only non-authentic output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Return the most recent non-authentic result.
    #[default]
    Lenient,
    /// Report a `not_authentic` failure.
    Strict,
}

pub struct FallbackSelector {
    primary: Arc<dyn ComputeBackend>,
    secondary: Option<Arc<dyn ComputeBackend>>,
    authenticity: AuthenticityPolicy,
    policy: FallbackPolicy,
}

impl FallbackSelector {
    pub fn new(primary: Arc<dyn ComputeBackend>) -> Self {
        Self {
            primary,
            secondary: None,
            authenticity: AuthenticityPolicy::default(),
            policy: FallbackPolicy::default(),
        }
    }

    pub fn with_secondary(mut self, secondary: Arc<dyn ComputeBackend>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn with_authenticity(mut self, authenticity: AuthenticityPolicy) -> Self {
        self.authenticity = authenticity;
        self
    }

    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    /// Run the generation, falling back as needed. Never panics or errors;
    /// every outcome is a [`BackendResult`].
    pub async fn generate(&self, input: &GenerationInput) -> BackendResult {
        let attempts = std::iter::once(&self.primary).chain(self.secondary.as_ref());

        let mut placeholder: Option<(BackendResult, String)> = None;
        let mut last_failure: Option<BackendResult> = None;

        for backend in attempts {
            if input.cancel.is_cancelled() {
                return BackendResult::failure(backend.name(), BackendError::Cancelled);
            }

            let result = run_guarded(backend.as_ref(), input).await;

            if let Some(error) = result.error() {
                if error.is_cancelled() {
                    return result;
                }
                warn!(
                    task_id = %input.task_id,
                    backend = backend.name(),
                    code = error.code(),
                    error = %error,
                    "Backend attempt failed"
                );
                last_failure = Some(result);
                continue;
            }

            match self.authenticity.evaluate(&result) {
                Verdict::Authentic => {
                    info!(task_id = %input.task_id, backend = backend.name(), "Backend produced authentic output");
                    return result.with_authentic(true);
                }
                Verdict::NotAuthentic(reason) => {
                    warn!(
                        task_id = %input.task_id,
                        backend = backend.name(),
                        reason = %reason,
                        "Backend output is not authentic"
                    );
                    placeholder = Some((result.with_authentic(false), reason));
                }
            }
        }

        match (placeholder, self.policy) {
            (Some((result, reason)), FallbackPolicy::Lenient) => {
                warn!(
                    task_id = %input.task_id,
                    backend = result.backend(),
                    reason = %reason,
                    "No authentic output; returning placeholder result"
                );
                result
            }
            (Some((result, reason)), FallbackPolicy::Strict) => {
                BackendResult::failure(result.backend(), BackendError::NotAuthentic(reason))
            }
            (None, _) => last_failure.unwrap_or_else(|| {
                BackendResult::failure(
                    self.primary.name(),
                    BackendError::Failure("No backend attempt was made".to_string()),
                )
            }),
        }
    }
}

/// Invoke one backend, turning a panic into a failed result.
async fn run_guarded(backend: &dyn ComputeBackend, input: &GenerationInput) -> BackendResult {
    match AssertUnwindSafe(backend.generate(input)).catch_unwind().await {
        Ok(result) => result,
        Err(_) => BackendResult::failure(
            backend.name(),
            BackendError::Pipeline(format!("backend {} panicked", backend.name())),
        ),
    }
}
