//! Bounded concurrent hashing pipeline for hashsieve.
//!
//! A [`Pipeline`] owns three ordered collections (pending, processing and
//! completed) and moves each file record through them:
//!
//! 1. Paths are expanded into records and appended to Pending
//! 2. `drain` admits the head of Pending into Processing while fewer than
//!    the concurrency ceiling are running, dispatching a hash computation
//! 3. A finished computation moves its record to Completed, where the
//!    [`DuplicateGrouper`] tags it if another completed record shares its
//!    digest, and `drain` runs again to refill the slot
//!
//! All collection membership changes happen under one lock owned by the
//! coordinator; hash tasks only report results back.
//!
//! ```rust,no_run
//! use hashsieve_pipeline::{Pipeline, PipelineConfig};
//!
//! # async fn run() {
//! let pipeline = Pipeline::new(PipelineConfig::default());
//! let mut events = pipeline.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("{:?} ({} processing)", event.kind, event.counts.processing);
//!     }
//! });
//!
//! pipeline.add_paths(&["/photos"]);
//! pipeline.wait_idle().await;
//!
//! let report = pipeline.report();
//! println!("Found {} duplicate groups", report.group_count);
//! # }
//! ```

mod event;
mod grouper;
mod report;
mod scheduler;
mod selection;
mod state;

pub use event::{EventKind, PipelineEvent, StageCounts};
pub use grouper::{DuplicateGrouper, MarkerAssignment};
pub use report::{DuplicateGroup, DuplicateReport, FailureEntry};
pub use scheduler::{AddSummary, Pipeline};
pub use selection::{CompletedSort, SortDirection};
pub use state::FailedRecord;

// Re-export the types callers need to drive a pipeline
pub use hashsieve_core::{
    Concurrency, Digest, FileRecord, GroupMarker, HashAlgorithm, PipelineConfig, PipelineError,
    RecordFailure, RecordId, Stage,
};
pub use hashsieve_hash::{DigestEngine, HashEngine};
pub use hashsieve_ops::{DeleteError, Deleter, DeletionReport, PermanentDeleter, TrashDeleter};
pub use hashsieve_scan::{Candidate, IngestWarning};
