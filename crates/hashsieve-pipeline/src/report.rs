//! Duplicate summary built from completed records.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use hashsieve_core::{Digest, FileRecord, GroupMarker, RecordFailure};

use crate::state::FailedRecord;

/// A group of completed files sharing the same digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Digest shared by all files in this group.
    pub digest: Digest,

    /// Marker carried by the members.
    pub marker: Option<GroupMarker>,

    /// Display colour of the marker.
    pub color: Option<String>,

    /// Size of each file in bytes.
    pub size: u64,

    /// Paths in completion order; the first one is the file kept by
    /// duplicate selection.
    pub paths: Vec<PathBuf>,

    /// Wasted space: size * (count - 1).
    pub wasted_bytes: u64,
}

impl DuplicateGroup {
    /// Get the number of duplicate files.
    pub fn count(&self) -> usize {
        self.paths.len()
    }

    /// Check if keeping one file, how many could be deleted.
    pub fn deletable_count(&self) -> usize {
        self.paths.len().saturating_sub(1)
    }
}

/// A file that could not be hashed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEntry {
    pub path: PathBuf,
    pub failure: RecordFailure,
}

/// Results from a pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuplicateReport {
    /// Groups of duplicate files, in completion order of their first member.
    pub groups: Vec<DuplicateGroup>,

    /// Total size of all duplicate files.
    pub total_duplicate_size: u64,

    /// Total wasted space (could be reclaimed).
    pub total_wasted_space: u64,

    /// Number of files hashed successfully.
    pub files_hashed: u64,

    /// Number of files that failed to hash.
    pub files_failed: u64,

    /// Number of files that have duplicates.
    pub files_with_duplicates: u64,

    /// Number of unique duplicate groups.
    pub group_count: usize,

    /// Per-file failures.
    pub failures: Vec<FailureEntry>,
}

impl DuplicateReport {
    /// Build a report from the completed and failed collections.
    pub fn from_records(completed: &[FileRecord], failed: &[FailedRecord]) -> Self {
        let mut by_digest: IndexMap<&Digest, Vec<&FileRecord>> = IndexMap::new();
        for record in completed {
            if let Some(digest) = record.digest().filter(|d| !d.is_empty()) {
                by_digest.entry(digest).or_default().push(record);
            }
        }

        let groups: Vec<DuplicateGroup> = by_digest
            .into_iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|(digest, members)| {
                // Equal content means equal size unless a file changed
                // between ingestion and hashing.
                let size = members.iter().map(|r| r.size()).max().unwrap_or(0);
                DuplicateGroup {
                    digest: digest.clone(),
                    marker: members[0].marker(),
                    color: members[0].marker().map(|m| m.color().to_string()),
                    size,
                    wasted_bytes: size * (members.len() as u64 - 1),
                    paths: members.iter().map(|r| r.path().to_path_buf()).collect(),
                }
            })
            .collect();

        let failures = failed
            .iter()
            .map(|f| FailureEntry {
                path: f.record.path().to_path_buf(),
                failure: f.failure.clone(),
            })
            .collect();

        Self {
            total_duplicate_size: groups.iter().map(|g| g.size * g.count() as u64).sum(),
            total_wasted_space: groups.iter().map(|g| g.wasted_bytes).sum(),
            files_hashed: completed.len() as u64,
            files_failed: failed.len() as u64,
            files_with_duplicates: groups.iter().map(|g| g.count() as u64).sum(),
            group_count: groups.len(),
            groups,
            failures,
        }
    }

    /// Check if any duplicates were found.
    pub fn has_duplicates(&self) -> bool {
        !self.groups.is_empty()
    }

    /// Get total number of duplicate files across all groups.
    pub fn total_duplicate_files(&self) -> usize {
        self.groups.iter().map(|g| g.paths.len()).sum()
    }

    /// Get total number of files that could be deleted keeping one per group.
    pub fn total_deletable_files(&self) -> usize {
        self.groups.iter().map(DuplicateGroup::deletable_count).sum()
    }
}
