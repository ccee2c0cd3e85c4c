//! Configuration System
//!
//! Layered configuration: merge-policy defaults, then the global config file, then
//! workspace `config/config.toml` and `config/{SCULPT_ENV}.toml`, then
//! `SCULPT__SECTION__KEY` environment variables. Every field also carries a serde
//! default so partial files deserialize.

use crate::backend::BackendsConfig;
use crate::fallback::AuthenticityConfig;
use crate::logging::LoggingConfig;
use crate::orchestrator::OrchestratorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SculptConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub backends: BackendsConfig,

    #[serde(default)]
    pub authenticity: AuthenticityConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where artifacts and inputs are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("outputs/inputs")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
            input_dir: default_input_dir(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.artifact_dir.as_os_str().is_empty() {
            return Err("artifact_dir cannot be empty".to_string());
        }
        if self.input_dir.as_os_str().is_empty() {
            return Err("input_dir cannot be empty".to_string());
        }
        Ok(())
    }

    /// Anchor relative directories at `root`.
    pub fn resolved_against(&self, root: &Path) -> Self {
        let resolve = |path: &PathBuf| {
            if path.is_absolute() {
                path.clone()
            } else {
                root.join(path)
            }
        };
        Self {
            artifact_dir: resolve(&self.artifact_dir),
            input_dir: resolve(&self.input_dir),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Orchestrator(String),
    Storage(String),
    Backends(String),
    Authenticity(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Orchestrator(msg) => write!(f, "Orchestrator: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Backends(msg) => write!(f, "Backends: {}", msg),
            ValidationError::Authenticity(msg) => write!(f, "Authenticity: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl SculptConfig {
    /// Validate the entire configuration, reporting every problem found.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.orchestrator.validate() {
            errors.push(ValidationError::Orchestrator(e));
        }
        if let Err(e) = self.storage.validate() {
            errors.push(ValidationError::Storage(e));
        }
        if let Err(e) = self.backends.validate() {
            errors.push(ValidationError::Backends(e));
        }
        if let Err(e) = self.authenticity.validate() {
            errors.push(ValidationError::Authenticity(e));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
