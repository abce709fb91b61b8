//! File records and their lifecycle.

use std::path::{Path, PathBuf};
use std::time::Duration;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::algorithm::{Digest, HashAlgorithm};

/// Unique identifier for a record within a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl RecordId {
    /// Create a new RecordId from a u64.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle stage of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Waiting for a free slot.
    Pending,
    /// Being hashed.
    Processing,
    /// Hashed successfully.
    Completed,
    /// Hashing failed with an I/O error.
    Failed,
}

/// Display colours cycled through by [`GroupMarker::color`].
pub const MARKER_PALETTE: [&str; 12] = [
    "#f4a261", "#2a9d8f", "#e76f51", "#8ab17d", "#e9c46a", "#6d597a",
    "#b5838d", "#457b9d", "#a8dadc", "#ffb4a2", "#90be6d", "#c77dff",
];

/// Tag shared by every completed record with the same digest.
///
/// Markers are allocated sequentially, so two groups never share one; only
/// the display colour repeats once the palette is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupMarker(pub u32);

impl GroupMarker {
    /// Display colour for this marker.
    pub fn color(self) -> &'static str {
        MARKER_PALETTE[self.0 as usize % MARKER_PALETTE.len()]
    }
}

/// A single file moving through the hashing pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    id: RecordId,
    path: PathBuf,
    display_name: CompactString,
    size: u64,
    stage: Stage,
    algorithm: HashAlgorithm,
    digest: Option<Digest>,
    elapsed: Option<Duration>,
    marker: Option<GroupMarker>,
    selected: bool,
    #[serde(skip)]
    cancel: CancellationToken,
}

impl FileRecord {
    /// Create a new pending record.
    pub fn new(id: RecordId, path: impl Into<PathBuf>, size: u64) -> Self {
        let path = path.into();
        let display_name = path
            .file_name()
            .map(|n| CompactString::new(n.to_string_lossy()))
            .unwrap_or_else(|| CompactString::new(path.to_string_lossy()));

        Self {
            id,
            path,
            display_name,
            size,
            stage: Stage::Pending,
            algorithm: HashAlgorithm::None,
            digest: None,
            elapsed: None,
            marker: None,
            selected: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name derived from the path.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// File size in bytes at ingestion time.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Algorithm captured when the record was dispatched.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }

    /// Wall-clock duration of the hash computation.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    pub fn marker(&self) -> Option<GroupMarker> {
        self.marker
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    /// Token observed by the hashing engine.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Request cancellation of the in-flight computation.
    ///
    /// Repeated calls, or calls after completion, have no effect.
    pub fn cancel(&self) {
        if self.stage == Stage::Processing {
            self.cancel.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Move from Pending to Processing, capturing the algorithm.
    pub fn begin(&mut self, algorithm: HashAlgorithm) {
        debug_assert_eq!(self.stage, Stage::Pending);
        self.stage = Stage::Processing;
        self.algorithm = algorithm;
    }

    /// Move from Processing to Completed, freezing digest and elapsed time.
    pub fn complete(&mut self, digest: Digest, elapsed: Duration) {
        debug_assert_eq!(self.stage, Stage::Processing);
        self.stage = Stage::Completed;
        self.digest = Some(digest);
        self.elapsed = Some(elapsed);
    }

    /// Move from Processing to Failed.
    pub fn fail(&mut self, elapsed: Duration) {
        debug_assert_eq!(self.stage, Stage::Processing);
        self.stage = Stage::Failed;
        self.elapsed = Some(elapsed);
    }

    /// Set or clear the duplicate-group marker.
    pub fn set_marker(&mut self, marker: Option<GroupMarker>) {
        self.marker = marker;
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }
}
