//! The pipeline coordinator.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};

use hashsieve_core::{
    Concurrency, Digest, FileRecord, HashAlgorithm, HashError, PipelineConfig, PipelineError,
    RecordFailure, RecordId,
};
use hashsieve_hash::{DigestEngine, HashEngine};
use hashsieve_scan::{Candidate, IngestWarning, Ingestor};

use crate::event::{EventKind, PipelineEvent, StageCounts};
use crate::grouper::MarkerAssignment;
use crate::report::DuplicateReport;
use crate::state::{FailedRecord, PipelineState};

/// Outcome of [`Pipeline::add_paths`].
#[derive(Debug, Clone, Default)]
pub struct AddSummary {
    /// Records appended to Pending, in order.
    pub added: Vec<RecordId>,
    /// Files skipped because their path was already tracked.
    pub skipped: usize,
    /// Inputs that could not be expanded.
    pub warnings: Vec<IngestWarning>,
}

/// Bounded concurrent hashing pipeline.
///
/// Cloning is cheap; all clones drive the same collections.
pub struct Pipeline<E: DigestEngine = HashEngine> {
    pub(crate) shared: Arc<Shared<E>>,
}

impl<E: DigestEngine> Clone for Pipeline<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

pub(crate) struct Shared<E> {
    state: Mutex<PipelineState>,
    engine: E,
    ingestor: Ingestor,
    runtime: Handle,
    events: broadcast::Sender<PipelineEvent>,
    idle: watch::Sender<StageCounts>,
}

impl Pipeline<HashEngine> {
    /// Create a pipeline that hashes files with [`HashEngine`].
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(config: PipelineConfig) -> Self {
        let engine = HashEngine::with_chunk_size(config.chunk_size);
        Self::with_engine(config, engine)
    }
}

impl<E: DigestEngine> Pipeline<E> {
    /// Create a pipeline with a custom digest engine on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn with_engine(config: PipelineConfig, engine: E) -> Self {
        Self::with_runtime(config, engine, Handle::current())
    }

    /// Create a pipeline that spawns hash tasks on `runtime`.
    pub fn with_runtime(config: PipelineConfig, engine: E, runtime: Handle) -> Self {
        let state = PipelineState::new(&config);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (idle, _) = watch::channel(state.counts());
        let ingestor = Ingestor::new().with_follow_symlinks(config.follow_symlinks);

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                engine,
                ingestor,
                runtime,
                events,
                idle,
            }),
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.shared.events.subscribe()
    }

    /// Expand files and directories and enqueue every path not already
    /// pending, processing or completed.
    ///
    /// Inputs are canonicalised first, so aliases of a tracked file are
    /// skipped. Blocks on the directory walk; async callers should run it
    /// on a blocking thread.
    pub fn add_paths<P: AsRef<Path>>(&self, paths: &[P]) -> AddSummary {
        // Directory walks can be slow; keep them outside the lock.
        let mut expansion = self.shared.ingestor.expand(paths);

        let mut state = self.shared.lock();
        let found = expansion.candidates.len();
        expansion.retain_unknown(|path| state.is_tracked(path));
        let skipped = found - expansion.candidates.len();

        let added = self.shared.enqueue(&mut state, expansion.candidates);
        tracing::info!(added = added.len(), skipped, "added paths");

        AddSummary {
            added,
            skipped,
            warnings: expansion.warnings,
        }
    }

    /// Append candidates to Pending and dispatch as capacity allows.
    ///
    /// Candidate paths are used as supplied. Paths already tracked are
    /// ignored. Returns the ids of the new records.
    pub fn enqueue(&self, candidates: Vec<Candidate>) -> Vec<RecordId> {
        let mut state = self.shared.lock();
        self.shared.enqueue(&mut state, candidates)
    }

    /// Remove a record that has not started yet.
    pub fn remove_pending(&self, id: RecordId) -> Result<(), PipelineError> {
        let mut state = self.shared.lock();
        let index = state
            .pending
            .iter()
            .position(|r| r.id() == id)
            .ok_or(PipelineError::UnknownRecord { id })?;

        if let Some(record) = state.pending.remove(index) {
            state.untrack(record.path());
        }
        tracing::debug!(%id, "removed pending record");
        self.shared.emit(&state, EventKind::PendingRemoved { id });
        Ok(())
    }

    /// Cancel an in-flight computation and free its slot.
    ///
    /// The record leaves Processing immediately and never reaches
    /// Completed. Returns `false` if the record is not processing, which
    /// makes repeated calls harmless.
    pub fn cancel_processing(&self, id: RecordId) -> bool {
        let mut state = self.shared.lock();
        let Some(index) = state.processing_index(id) else {
            return false;
        };

        let record = state.processing.remove(index);
        record.cancel();
        state.untrack(record.path());
        tracing::debug!(%id, path = %record.path().display(), "cancelled record");
        self.shared.emit(&state, EventKind::Cancelled { id });

        self.shared.drain(&mut state);
        true
    }

    /// Drop everything pending and cancel everything processing.
    ///
    /// Returns the number of records removed.
    pub fn cancel_all(&self) -> usize {
        let mut state = self.shared.lock();
        let pending: Vec<FileRecord> = state.pending.drain(..).collect();
        let processing: Vec<FileRecord> = state.processing.drain(..).collect();

        for record in &pending {
            state.untrack(record.path());
            self.shared
                .emit(&state, EventKind::PendingRemoved { id: record.id() });
        }
        for record in &processing {
            record.cancel();
            state.untrack(record.path());
            self.shared.emit(&state, EventKind::Cancelled { id: record.id() });
        }

        let removed = pending.len() + processing.len();
        if removed > 0 {
            tracing::info!(removed, "cancelled all work");
        }
        removed
    }

    /// Change the concurrency ceiling. Only 1, 2, 4, 8, 16 and 32 are valid.
    pub fn set_concurrency(&self, value: usize) -> Result<(), PipelineError> {
        self.set_concurrency_ceiling(Concurrency::try_from(value)?);
        Ok(())
    }

    /// Change the concurrency ceiling.
    ///
    /// Raising it dispatches into the extra capacity right away. Lowering it
    /// never touches running work; dispatch pauses until processing drops
    /// below the new ceiling.
    pub fn set_concurrency_ceiling(&self, ceiling: Concurrency) {
        let mut state = self.shared.lock();
        let from = state.ceiling;
        if from == ceiling {
            return;
        }

        state.ceiling = ceiling;
        tracing::info!(%from, to = %ceiling, "concurrency changed");
        self.shared
            .emit(&state, EventKind::CeilingChanged { from, to: ceiling });

        if ceiling.get() > from.get() {
            self.shared.drain(&mut state);
        }
    }

    /// Change the algorithm used by records dispatched from now on.
    ///
    /// Records already processing or completed keep the algorithm they
    /// were dispatched with.
    pub fn set_algorithm(&self, algorithm: HashAlgorithm) -> Result<(), PipelineError> {
        if !algorithm.is_selectable() {
            return Err(PipelineError::UnselectableAlgorithm {
                name: algorithm.to_string(),
            });
        }

        let mut state = self.shared.lock();
        if state.algorithm != algorithm {
            state.algorithm = algorithm;
            tracing::info!(%algorithm, "algorithm changed");
            self.shared
                .emit(&state, EventKind::AlgorithmChanged { algorithm });
        }
        Ok(())
    }

    pub fn concurrency(&self) -> Concurrency {
        self.shared.lock().ceiling
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.shared.lock().algorithm
    }

    /// Current collection sizes.
    pub fn counts(&self) -> StageCounts {
        self.shared.lock().counts()
    }

    /// Wait until nothing is pending or processing.
    pub async fn wait_idle(&self) {
        let mut idle = self.shared.idle.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = idle.wait_for(StageCounts::is_idle).await;
    }

    /// Pending records in dispatch order.
    pub fn pending(&self) -> Vec<FileRecord> {
        self.shared.lock().pending.iter().cloned().collect()
    }

    /// Processing records in dispatch order.
    pub fn processing(&self) -> Vec<FileRecord> {
        self.shared.lock().processing.clone()
    }

    /// Completed records in completion order.
    pub fn completed(&self) -> Vec<FileRecord> {
        self.shared.lock().completed.clone()
    }

    /// Records whose computation failed, oldest first.
    pub fn failed(&self) -> Vec<FailedRecord> {
        self.shared.lock().failed.clone()
    }

    /// Look a record up in any collection.
    pub fn record(&self, id: RecordId) -> Option<FileRecord> {
        self.shared.lock().find(id).cloned()
    }

    /// Summarise duplicate groups and failures among finished records.
    pub fn report(&self) -> DuplicateReport {
        let state = self.shared.lock();
        DuplicateReport::from_records(&state.completed, &state.failed)
    }
}

impl<E: DigestEngine> Shared<E> {
    pub(crate) fn lock(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a change along with the counts after it.
    pub(crate) fn emit(&self, state: &PipelineState, kind: EventKind) {
        let counts = state.counts();
        // No subscribers is fine.
        let _ = self.events.send(PipelineEvent { kind, counts });
        // Publish counts after the event so idle waiters see it buffered.
        self.idle.send_if_modified(|current| {
            let changed = *current != counts;
            *current = counts;
            changed
        });
    }

    fn enqueue(
        self: &Arc<Self>,
        state: &mut PipelineState,
        candidates: Vec<Candidate>,
    ) -> Vec<RecordId> {
        let mut added = Vec::with_capacity(candidates.len());

        for Candidate { path, size } in candidates {
            if state.is_tracked(&path) {
                continue;
            }

            let id = state.allocate_id();
            state.track(path.clone());
            state.pending.push_back(FileRecord::new(id, path.clone(), size));
            self.emit(state, EventKind::Enqueued { id, path });
            added.push(id);
        }

        self.drain(state);
        added
    }

    /// Admit the head of Pending into Processing while there is headroom.
    fn drain(self: &Arc<Self>, state: &mut PipelineState) {
        while state.has_headroom() {
            let Some(mut record) = state.pending.pop_front() else {
                break;
            };

            let algorithm = state.algorithm;
            record.begin(algorithm);

            let id = record.id();
            let path = record.path().to_path_buf();
            let cancel = record.cancel_token().clone();
            state.processing.push(record);

            tracing::debug!(%id, path = %path.display(), %algorithm, "dispatched");
            self.emit(state, EventKind::Dispatched { id, algorithm });

            let shared = Arc::clone(self);
            self.runtime.spawn_blocking(move || {
                let started = Instant::now();
                let outcome = shared.engine.compute(&path, algorithm, &cancel);
                shared.finish(id, &path, outcome, started.elapsed());
            });
        }
    }

    /// Apply the outcome of a hash task and refill its slot.
    fn finish(
        self: &Arc<Self>,
        id: RecordId,
        path: &Path,
        outcome: Result<Digest, HashError>,
        elapsed: Duration,
    ) {
        let mut state = self.lock();
        let Some(index) = state.processing_index(id) else {
            // Cancelled while running.
            tracing::trace!(%id, "discarded result for record no longer processing");
            return;
        };
        let mut record = state.processing.remove(index);

        match outcome {
            Ok(digest) => {
                record.complete(digest.clone(), elapsed);
                let assignment = {
                    let PipelineState {
                        grouper, completed, ..
                    } = &mut *state;
                    grouper.on_completed(&mut record, completed)
                };
                let marker = record.marker();
                state.completed.push(record);

                tracing::debug!(%id, path = %path.display(), %digest, ?elapsed, "completed");
                self.emit(
                    &state,
                    EventKind::Completed {
                        id,
                        digest,
                        elapsed,
                        marker,
                    },
                );

                if let Some(MarkerAssignment {
                    marker,
                    newly_marked: Some(first),
                }) = assignment
                {
                    self.emit(&state, EventKind::MarkerAssigned { id: first, marker });
                }
            }
            Err(error) => {
                state.untrack(path);
                match RecordFailure::from_error(&error) {
                    Some(failure) => {
                        tracing::warn!(%id, path = %path.display(), "hashing failed: {error}");
                        record.fail(elapsed);
                        state.failed.push(FailedRecord {
                            record,
                            failure: failure.clone(),
                        });
                        self.emit(&state, EventKind::Failed { id, failure });
                    }
                    None => {
                        tracing::debug!(%id, "computation observed cancellation");
                        self.emit(&state, EventKind::Cancelled { id });
                    }
                }
            }
        }

        self.drain(&mut state);
    }
}
