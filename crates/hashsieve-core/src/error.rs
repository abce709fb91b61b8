//! Error types for hashing and pipeline operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::RecordId;

/// Errors that can occur while hashing a single file.
#[derive(Debug, Error)]
pub enum HashError {
    /// The computation was cancelled. Not a failure.
    #[error("Hash computation cancelled")]
    Cancelled,

    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found (e.g. deleted after it was queued).
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Algorithm outside the supported set.
    #[error("Invalid hash algorithm: {name}")]
    InvalidAlgorithm { name: String },
}

impl HashError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    /// Check if this is the cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors returned by pipeline commands.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Concurrency outside the allowed options.
    #[error("Invalid concurrency {value}: expected one of 1, 2, 4, 8, 16, 32")]
    InvalidConcurrency { value: usize },

    /// Algorithm that cannot be selected.
    #[error("Algorithm {name} cannot be selected")]
    UnselectableAlgorithm { name: String },

    /// No record with this id in the expected collection.
    #[error("Unknown record: {id}")]
    UnknownRecord { id: RecordId },
}

/// Kind of per-record failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    PermissionDenied,
    NotFound,
    ReadError,
    InvalidAlgorithm,
}

/// Serialisable description of why a record failed to hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    /// Kind of failure.
    pub kind: FailureKind,
    /// Human-readable message.
    pub message: String,
}

impl RecordFailure {
    /// Snapshot a hash error. Returns `None` for cancellation.
    pub fn from_error(error: &HashError) -> Option<Self> {
        let kind = match error {
            HashError::Cancelled => return None,
            HashError::PermissionDenied { .. } => FailureKind::PermissionDenied,
            HashError::NotFound { .. } => FailureKind::NotFound,
            HashError::Io { .. } => FailureKind::ReadError,
            HashError::InvalidAlgorithm { .. } => FailureKind::InvalidAlgorithm,
        };
        Some(Self {
            kind,
            message: error.to_string(),
        })
    }
}

impl std::fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
