//! Input image persistence.

use super::{validate_file_name, write_atomic};
use crate::error::StorageError;
use crate::types::TaskId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reference to a stored input image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputRef(String);

impl InputRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait InputStore: Send + Sync {
    fn persist(&self, task_id: &TaskId, image: &[u8]) -> Result<InputRef, StorageError>;

    fn read(&self, input: &InputRef) -> Result<Option<Vec<u8>>, StorageError>;
}

/// Stores inputs as `{root}/{task_id}_input.{ext}`.
#[derive(Debug, Clone)]
pub struct FsInputStore {
    root: PathBuf,
}

impl FsInputStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to create input directory at {:?}: {}", root, e),
            ))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl InputStore for FsInputStore {
    fn persist(&self, task_id: &TaskId, image: &[u8]) -> Result<InputRef, StorageError> {
        let input = InputRef(format!("{}_input.{}", task_id, sniff_extension(image)));
        write_atomic(&self.root.join(input.as_str()), image)?;
        debug!(task_id = %task_id, input = %input, bytes = image.len(), "Input persisted");
        Ok(input)
    }

    fn read(&self, input: &InputRef) -> Result<Option<Vec<u8>>, StorageError> {
        validate_file_name(input.as_str())?;
        match fs::read(self.root.join(input.as_str())) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::IoError(e)),
        }
    }
}

/// Image format from the magic bytes: `png`, `jpg` or `webp`.
pub fn detect_image_format(image: &[u8]) -> Option<&'static str> {
    if image.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("png")
    } else if image.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if image.len() >= 12 && &image[0..4] == b"RIFF" && &image[8..12] == b"WEBP" {
        Some("webp")
    } else {
        None
    }
}

fn sniff_extension(image: &[u8]) -> &'static str {
    detect_image_format(image).unwrap_or("bin")
}
