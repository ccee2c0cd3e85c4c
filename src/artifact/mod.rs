//! Artifact and input persistence
//!
//! Generated artifacts live under a flat directory as `{task_id}.{glb|ply|mp4}`;
//! uploaded inputs as `{task_id}_input.{ext}`. Both are written atomically.

pub mod input;
pub mod storage;

pub use input::{detect_image_format, FsInputStore, InputRef, InputStore};
pub use storage::{ArtifactLocator, ArtifactStore, FsArtifactStore};

use crate::error::StorageError;
use std::fs;
use std::path::Path;

/// Write `bytes` to `path` via a sibling `.tmp` file and a rename, so readers
/// never observe a truncated file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = std::path::PathBuf::from(temp_name);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to create parent directory {:?}: {}", parent, e),
            ))
        })?;
    }

    fs::write(&temp_path, bytes).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        StorageError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to write {:?}: {}", temp_path, e),
        ))
    })?;

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        StorageError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to rename temp file to {:?}: {}", path, e),
        ))
    })
}

/// Locators and input refs are bare file names inside their store's root.
pub(crate) fn validate_file_name(name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidLocator(name.to_string()))
    }
}
