//! Outcome of a batch deletion.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::OperationError;

/// Result of deleting the selected records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeletionReport {
    /// Paths successfully removed, in the order they were processed.
    pub deleted: Vec<PathBuf>,
    /// Bytes freed by the removed files.
    pub bytes_freed: u64,
    /// Files that could not be removed.
    pub errors: Vec<OperationError>,
}

impl DeletionReport {
    /// Record a successful removal.
    pub fn record_deleted(&mut self, path: PathBuf, bytes: u64) {
        self.deleted.push(path);
        self.bytes_freed += bytes;
    }

    /// Record a failed removal.
    pub fn record_error(&mut self, error: OperationError) {
        self.errors.push(error);
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    pub fn failed_count(&self) -> usize {
        self.errors.len()
    }

    /// Check if every selected file was removed.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get a human-readable summary of the deletion.
    pub fn summary(&self) -> String {
        if self.errors.is_empty() {
            format!("Deleted {} items", self.deleted.len())
        } else {
            format!(
                "Deleted {} items, {} failed",
                self.deleted.len(),
                self.errors.len()
            )
        }
    }
}
