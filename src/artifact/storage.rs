//! Artifact storage
//!
//! Persists the byte payloads of a finished generation and serves them back by
//! locator. The filesystem implementation stores each artifact at
//! `{root}/{task_id}.{extension}`.

use super::{validate_file_name, write_atomic};
use crate::error::StorageError;
use crate::types::{ArtifactKind, ArtifactPayloads, ArtifactSet, TaskId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Opaque reference to a persisted artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactLocator(String);

impl ArtifactLocator {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persistence of generated artifacts.
pub trait ArtifactStore: Send + Sync {
    /// Store one artifact. Either the whole payload is stored or an error is
    /// returned and nothing readable is left behind.
    fn persist(
        &self,
        task_id: &TaskId,
        kind: ArtifactKind,
        bytes: &[u8],
    ) -> Result<ArtifactLocator, StorageError>;

    fn exists(&self, locator: &ArtifactLocator) -> bool;

    /// `Ok(None)` when nothing is stored under the locator.
    fn read(&self, locator: &ArtifactLocator) -> Result<Option<Vec<u8>>, StorageError>;

    /// Best-effort removal; missing entries are ignored.
    fn cleanup(&self, locators: &[ArtifactLocator]);

    /// Store all three payloads of a generation. If any write fails, the
    /// artifacts already written for this call are removed.
    fn persist_all(
        &self,
        task_id: &TaskId,
        payloads: &ArtifactPayloads,
    ) -> Result<ArtifactSet<ArtifactLocator>, StorageError> {
        let mut written = Vec::with_capacity(3);
        for (kind, bytes) in payloads.iter() {
            match self.persist(task_id, kind, bytes) {
                Ok(locator) => written.push(locator),
                Err(e) => {
                    self.cleanup(&written);
                    return Err(e);
                }
            }
        }

        let mut written = written.into_iter();
        match (written.next(), written.next(), written.next()) {
            (Some(scene), Some(point_cloud), Some(preview)) => {
                Ok(ArtifactSet::new(scene, point_cloud, preview))
            }
            _ => Err(StorageError::InvalidLocator(format!(
                "incomplete artifact set for task {}",
                task_id
            ))),
        }
    }
}

/// Filesystem-backed artifact store.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to create artifact directory at {:?}: {}", root, e),
            ))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Locator an artifact of `kind` for `task_id` is stored under.
    pub fn locator_for(task_id: &TaskId, kind: ArtifactKind) -> ArtifactLocator {
        ArtifactLocator(format!("{}.{}", task_id, kind.extension()))
    }

    fn resolve(&self, locator: &ArtifactLocator) -> Result<PathBuf, StorageError> {
        validate_file_name(locator.as_str())?;
        Ok(self.root.join(locator.as_str()))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn persist(
        &self,
        task_id: &TaskId,
        kind: ArtifactKind,
        bytes: &[u8],
    ) -> Result<ArtifactLocator, StorageError> {
        let locator = Self::locator_for(task_id, kind);
        let path = self.resolve(&locator)?;
        write_atomic(&path, bytes)?;
        debug!(task_id = %task_id, kind = %kind, bytes = bytes.len(), "Artifact persisted");
        Ok(locator)
    }

    fn exists(&self, locator: &ArtifactLocator) -> bool {
        self.resolve(locator)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    fn read(&self, locator: &ArtifactLocator) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.resolve(locator)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to read artifact {:?}: {}", path, e),
            ))),
        }
    }

    fn cleanup(&self, locators: &[ArtifactLocator]) {
        for locator in locators {
            let path = match self.resolve(locator) {
                Ok(path) => path,
                Err(_) => continue,
            };
            match fs::remove_file(&path) {
                Ok(()) => debug!(locator = %locator, "Artifact removed"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(locator = %locator, error = %e, "Failed to remove artifact"),
            }
        }
    }
}
