//! Deletion backends.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while removing a file.
#[derive(Debug, Error)]
pub enum DeleteError {
    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// The platform trash refused the file.
    #[error("Failed to move {path} to trash: {message}")]
    Trash { path: PathBuf, message: String },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DeleteError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Capability to remove a file from storage.
pub trait Deleter: Send + Sync {
    /// Remove the file at `path`.
    fn delete(&self, path: &Path) -> Result<(), DeleteError>;
}

/// Moves files to the platform recycle bin.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrashDeleter;

impl Deleter for TrashDeleter {
    fn delete(&self, path: &Path) -> Result<(), DeleteError> {
        if !path.exists() {
            return Err(DeleteError::NotFound {
                path: path.to_path_buf(),
            });
        }
        trash::delete(path).map_err(|e| DeleteError::Trash {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "moved to trash");
        Ok(())
    }
}

/// Removes files permanently.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermanentDeleter;

impl Deleter for PermanentDeleter {
    fn delete(&self, path: &Path) -> Result<(), DeleteError> {
        fs::remove_file(path).map_err(|e| DeleteError::io(path, e))?;
        tracing::debug!(path = %path.display(), "deleted permanently");
        Ok(())
    }
}

impl<D: Deleter + ?Sized> Deleter for &D {
    fn delete(&self, path: &Path) -> Result<(), DeleteError> {
        (**self).delete(path)
    }
}
