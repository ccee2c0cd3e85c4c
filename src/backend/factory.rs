//! Construct backends and the fallback selector from configuration.

use super::local::{LocalBackendConfig, LocalPipelineBackend};
use super::remote::RemoteJobBackend;
use super::ComputeBackend;
use crate::error::BackendError;
use crate::fallback::{AuthenticityConfig, AuthenticityPolicy, FallbackPolicy, FallbackSelector};
use crate::remote::RemoteClientConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Local,
    Remote,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Local => f.write_str("local"),
            BackendKind::Remote => f.write_str("remote"),
        }
    }
}

/// `[backends]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default = "default_primary")]
    pub primary: BackendKind,

    #[serde(default)]
    pub secondary: Option<BackendKind>,

    #[serde(default)]
    pub fallback_policy: FallbackPolicy,

    #[serde(default)]
    pub local: LocalBackendConfig,

    #[serde(default)]
    pub remote: RemoteClientConfig,
}

fn default_primary() -> BackendKind {
    BackendKind::Local
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            secondary: None,
            fallback_policy: FallbackPolicy::default(),
            local: LocalBackendConfig::default(),
            remote: RemoteClientConfig::default(),
        }
    }
}

impl BackendsConfig {
    fn uses(&self, kind: BackendKind) -> bool {
        self.primary == kind || self.secondary == Some(kind)
    }

    /// Validate only the backends that are actually selected.
    pub fn validate(&self) -> Result<(), String> {
        if self.secondary == Some(self.primary) {
            return Err(format!(
                "secondary backend must differ from primary ({})",
                self.primary
            ));
        }
        if self.uses(BackendKind::Local) {
            self.local.validate().map_err(|e| format!("local: {}", e))?;
        }
        if self.uses(BackendKind::Remote) {
            self.remote.validate().map_err(|e| format!("remote: {}", e))?;
        }
        Ok(())
    }
}

pub fn build_backend(
    kind: BackendKind,
    config: &BackendsConfig,
) -> Result<Arc<dyn ComputeBackend>, BackendError> {
    match kind {
        BackendKind::Local => Ok(Arc::new(LocalPipelineBackend::from_config(&config.local))),
        BackendKind::Remote => Ok(Arc::new(RemoteJobBackend::from_config(config.remote.clone())?)),
    }
}

pub fn build_selector(
    backends: &BackendsConfig,
    authenticity: &AuthenticityConfig,
) -> Result<FallbackSelector, BackendError> {
    let mut selector = FallbackSelector::new(build_backend(backends.primary, backends)?)
        .with_authenticity(AuthenticityPolicy::new(authenticity.clone()))
        .with_policy(backends.fallback_policy);
    if let Some(secondary) = backends.secondary {
        selector = selector.with_secondary(build_backend(secondary, backends)?);
    }
    Ok(selector)
}
