//! Sculpt: Image-to-3D Generation Orchestration
//!
//! Accepts generation requests, runs each as a tracked background task against a
//! local pipeline or a remote job service, falls back between backends when output
//! is missing or placeholder, and stores the resulting scene, point cloud and
//! preview artifacts for retrieval.

pub mod artifact;
pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod fallback;
pub mod logging;
pub mod orchestrator;
pub mod registry;
pub mod remote;
pub mod task;
pub mod types;

pub use error::{BackendError, OrchestratorError, RegistryError, StorageError};
pub use orchestrator::{GenerationOrchestrator, OrchestratorConfig};
pub use task::{TaskStatus, TaskView};
pub use types::{ArtifactKind, GenerationParameters, TaskId};
