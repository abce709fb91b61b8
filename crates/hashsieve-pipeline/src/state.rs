//! Collections owned by the pipeline coordinator.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use serde::Serialize;

use hashsieve_core::{
    Concurrency, FileRecord, HashAlgorithm, PipelineConfig, RecordFailure, RecordId,
};

use crate::event::StageCounts;
use crate::grouper::DuplicateGrouper;

/// A record whose hash computation failed, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct FailedRecord {
    pub record: FileRecord,
    pub failure: RecordFailure,
}

/// Everything guarded by the coordinator lock.
///
/// `tracked` holds every path currently in Pending, Processing or
/// Completed, so a path can only live in one of them at a time.
#[derive(Debug)]
pub(crate) struct PipelineState {
    next_id: u64,
    pub(crate) ceiling: Concurrency,
    pub(crate) algorithm: HashAlgorithm,
    pub(crate) pending: VecDeque<FileRecord>,
    pub(crate) processing: Vec<FileRecord>,
    pub(crate) completed: Vec<FileRecord>,
    pub(crate) failed: Vec<FailedRecord>,
    pub(crate) grouper: DuplicateGrouper,
    tracked: HashSet<PathBuf>,
}

impl PipelineState {
    pub(crate) fn new(config: &PipelineConfig) -> Self {
        Self {
            next_id: 0,
            ceiling: config.concurrency,
            algorithm: config.algorithm,
            pending: VecDeque::new(),
            processing: Vec::new(),
            completed: Vec::new(),
            failed: Vec::new(),
            grouper: DuplicateGrouper::new(),
            tracked: HashSet::new(),
        }
    }

    pub(crate) fn allocate_id(&mut self) -> RecordId {
        let id = RecordId::new(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn is_tracked(&self, path: &Path) -> bool {
        self.tracked.contains(path)
    }

    /// Start tracking `path`, dropping any stale failure for it.
    pub(crate) fn track(&mut self, path: PathBuf) {
        self.failed.retain(|f| f.record.path() != path.as_path());
        self.tracked.insert(path);
    }

    pub(crate) fn untrack(&mut self, path: &Path) {
        self.tracked.remove(path);
    }

    pub(crate) fn has_headroom(&self) -> bool {
        self.processing.len() < self.ceiling.get()
    }

    pub(crate) fn counts(&self) -> StageCounts {
        StageCounts {
            pending: self.pending.len(),
            processing: self.processing.len(),
            completed: self.completed.len(),
            failed: self.failed.len(),
        }
    }

    pub(crate) fn processing_index(&self, id: RecordId) -> Option<usize> {
        self.processing.iter().position(|r| r.id() == id)
    }

    pub(crate) fn completed_index(&self, id: RecordId) -> Option<usize> {
        self.completed.iter().position(|r| r.id() == id)
    }

    /// Look a record up in any collection.
    pub(crate) fn find(&self, id: RecordId) -> Option<&FileRecord> {
        self.pending
            .iter()
            .chain(self.processing.iter())
            .chain(self.completed.iter())
            .chain(self.failed.iter().map(|f| &f.record))
            .find(|r| r.id() == id)
    }
}
