//! Change notifications emitted by the pipeline.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use hashsieve_core::{Concurrency, Digest, GroupMarker, HashAlgorithm, RecordFailure, RecordId};

/// Number of records in each collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StageCounts {
    /// Check if no work is queued or running.
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.processing == 0
    }
}

/// What changed.
#[derive(Debug, Clone)]
pub enum EventKind {
    /// A record was appended to Pending.
    Enqueued { id: RecordId, path: PathBuf },
    /// A record moved from Pending to Processing.
    Dispatched { id: RecordId, algorithm: HashAlgorithm },
    /// A record moved from Processing to Completed.
    Completed {
        id: RecordId,
        digest: Digest,
        elapsed: Duration,
        marker: Option<GroupMarker>,
    },
    /// An already-completed record joined a duplicate group.
    MarkerAssigned { id: RecordId, marker: GroupMarker },
    /// A record's marker was cleared because its group shrank to one.
    MarkerCleared { id: RecordId },
    /// Hashing failed; the record moved to the failed list.
    Failed { id: RecordId, failure: RecordFailure },
    /// A processing record was cancelled and dropped.
    Cancelled { id: RecordId },
    /// A pending record was removed before it started.
    PendingRemoved { id: RecordId },
    /// The concurrency ceiling changed.
    CeilingChanged { from: Concurrency, to: Concurrency },
    /// The algorithm used for future dispatches changed.
    AlgorithmChanged { algorithm: HashAlgorithm },
    /// A completed record was selected or deselected.
    SelectionChanged { id: RecordId, selected: bool },
    /// A completed record was removed from the list.
    Removed { id: RecordId },
}

/// A change notification with the collection sizes right after it.
#[derive(Debug, Clone)]
pub struct PipelineEvent {
    pub kind: EventKind,
    pub counts: StageCounts,
}
