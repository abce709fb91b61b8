use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use hashsieve_core::{FailureKind, HashError};
use hashsieve_pipeline::{
    Candidate, Concurrency, Digest, DigestEngine, EventKind, HashAlgorithm, HashEngine, Pipeline,
    PipelineConfig, PipelineError, PipelineEvent, RecordId, Stage,
};
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Engine that holds every computation until the test releases its path.
///
/// Waiters poll so that a cancelled token or the safety timeout always lets
/// the blocking thread finish.
struct GatedEngine {
    inner: HashEngine,
    gate: Mutex<Gate>,
    changed: Condvar,
}

#[derive(Default)]
struct Gate {
    open: bool,
    released: HashSet<PathBuf>,
}

impl GatedEngine {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: HashEngine::new(),
            gate: Mutex::new(Gate::default()),
            changed: Condvar::new(),
        })
    }

    fn release(&self, path: &Path) {
        self.gate.lock().unwrap().released.insert(path.to_path_buf());
        self.changed.notify_all();
    }

    fn open(&self) {
        self.gate.lock().unwrap().open = true;
        self.changed.notify_all();
    }
}

impl DigestEngine for GatedEngine {
    fn compute(
        &self,
        path: &Path,
        algorithm: HashAlgorithm,
        cancel: &CancellationToken,
    ) -> Result<Digest, HashError> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut gate = self.gate.lock().unwrap();
        while !gate.open && !gate.released.contains(path) && !cancel.is_cancelled() {
            if Instant::now() >= deadline {
                break;
            }
            gate = self
                .changed
                .wait_timeout(gate, Duration::from_millis(10))
                .unwrap()
                .0;
        }
        drop(gate);

        self.inner.compute(path, algorithm, cancel)
    }
}

fn config(concurrency: usize) -> PipelineConfig {
    PipelineConfig::builder()
        .concurrency(Concurrency::try_from(concurrency).unwrap())
        .build()
        .unwrap()
}

/// Write `files` under `dir` and return their canonical paths.
fn write_files(dir: &Path, files: &[(&str, &str)]) -> Vec<PathBuf> {
    let dir = dir.canonicalize().unwrap();
    files
        .iter()
        .map(|(name, content)| {
            let path = dir.join(name);
            fs::write(&path, content).unwrap();
            path
        })
        .collect()
}

fn paths_of(records: &[hashsieve_pipeline::FileRecord]) -> Vec<PathBuf> {
    records.iter().map(|r| r.path().to_path_buf()).collect()
}

fn drain_events(rx: &mut broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn dispatched(events: &[PipelineEvent]) -> Vec<RecordId> {
    events
        .iter()
        .filter_map(|e| match e.kind {
            EventKind::Dispatched { id, .. } => Some(id),
            _ => None,
        })
        .collect()
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !check() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wait_idle_on_empty_pipeline() {
    let pipeline = Pipeline::new(PipelineConfig::default());
    pipeline.wait_idle().await;
    assert!(pipeline.counts().is_idle());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_processing_never_exceeds_ceiling() {
    let temp = TempDir::new().unwrap();
    let names: Vec<String> = (0..12).map(|i| format!("file{i:02}.bin")).collect();
    let files: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), n.as_str())).collect();
    let paths = write_files(temp.path(), &files);

    let engine = GatedEngine::new();
    let pipeline = Pipeline::with_engine(config(2), Arc::clone(&engine));
    let mut events = pipeline.subscribe();

    let summary = pipeline.add_paths(&paths);
    assert_eq!(summary.added.len(), 12);
    assert_eq!(pipeline.processing().len(), 2);
    assert_eq!(pipeline.pending().len(), 10);

    engine.open();
    pipeline.wait_idle().await;

    let events = drain_events(&mut events);
    assert!(events.iter().all(|e| e.counts.processing <= 2));
    assert_eq!(dispatched(&events).len(), 12);
    assert_eq!(pipeline.completed().len(), 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fifo_dispatch_order() {
    let temp = TempDir::new().unwrap();
    let paths = write_files(temp.path(), &[("c.txt", "1"), ("a.txt", "2"), ("b.txt", "3")]);

    let pipeline = Pipeline::new(config(1));
    let mut events = pipeline.subscribe();

    let summary = pipeline.add_paths(&paths);
    pipeline.wait_idle().await;

    // Inputs keep the order they were given in.
    assert_eq!(dispatched(&drain_events(&mut events)), summary.added);
    assert_eq!(paths_of(&pipeline.completed()), paths);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_slots_three_files() {
    let temp = TempDir::new().unwrap();
    let paths = write_files(
        temp.path(),
        &[("f1", "same bytes"), ("f2", "same bytes"), ("f3", "other bytes")],
    );

    let engine = GatedEngine::new();
    let pipeline = Pipeline::with_engine(config(2), Arc::clone(&engine));
    let mut events = pipeline.subscribe();
    let ids = pipeline.add_paths(&paths).added;

    assert_eq!(paths_of(&pipeline.processing()), paths[..2]);
    assert_eq!(paths_of(&pipeline.pending()), paths[2..]);

    engine.release(&paths[0]);
    wait_until(|| pipeline.processing().iter().any(|r| r.id() == ids[2])).await;
    assert_eq!(pipeline.completed().len(), 1);

    engine.open();
    pipeline.wait_idle().await;

    let completed = pipeline.completed();
    assert_eq!(completed.len(), 3);
    let marker = |id: RecordId| completed.iter().find(|r| r.id() == id).unwrap().marker();
    assert!(marker(ids[0]).is_some());
    assert_eq!(marker(ids[0]), marker(ids[1]));
    assert_eq!(marker(ids[2]), None);

    // f3 is admitted only after f1 finished.
    let events = drain_events(&mut events);
    let position = |pred: &dyn Fn(&EventKind) -> bool| {
        events.iter().position(|e| pred(&e.kind)).unwrap()
    };
    let f1_done = position(&|k| matches!(k, EventKind::Completed { id, .. } if *id == ids[0]));
    let f3_start = position(&|k| matches!(k, EventKind::Dispatched { id, .. } if *id == ids[2]));
    assert!(f1_done < f3_start);
    assert_eq!(&dispatched(&events)[..2], &ids[..2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lowering_ceiling_keeps_running_work() {
    let temp = TempDir::new().unwrap();
    let paths = write_files(
        temp.path(),
        &[("1", "a"), ("2", "b"), ("3", "c"), ("4", "d"), ("5", "e")],
    );

    let engine = GatedEngine::new();
    let pipeline = Pipeline::with_engine(config(4), Arc::clone(&engine));
    pipeline.add_paths(&paths[..3]);
    assert_eq!(pipeline.processing().len(), 3);

    pipeline.set_concurrency(1).unwrap();
    assert_eq!(pipeline.concurrency().get(), 1);
    assert_eq!(paths_of(&pipeline.processing()), paths[..3]);

    pipeline.add_paths(&paths[3..]);
    assert_eq!(pipeline.pending().len(), 2);

    engine.release(&paths[0]);
    wait_until(|| pipeline.completed().len() == 1).await;
    assert_eq!(pipeline.processing().len(), 2);
    assert_eq!(pipeline.pending().len(), 2);

    engine.release(&paths[1]);
    engine.release(&paths[2]);
    wait_until(|| pipeline.completed().len() == 3).await;
    wait_until(|| pipeline.processing().len() == 1).await;
    assert_eq!(paths_of(&pipeline.processing()), paths[3..4]);
    assert_eq!(paths_of(&pipeline.pending()), paths[4..]);

    engine.open();
    pipeline.wait_idle().await;
    assert_eq!(pipeline.completed().len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_raising_ceiling_dispatches_immediately() {
    let temp = TempDir::new().unwrap();
    let paths = write_files(temp.path(), &[("1", "a"), ("2", "b"), ("3", "c")]);

    let engine = GatedEngine::new();
    let pipeline = Pipeline::with_engine(config(1), Arc::clone(&engine));
    pipeline.add_paths(&paths);
    assert_eq!(pipeline.processing().len(), 1);

    pipeline.set_concurrency(4).unwrap();
    assert_eq!(pipeline.processing().len(), 3);
    assert!(pipeline.pending().is_empty());

    engine.open();
    pipeline.wait_idle().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_concurrency_rejected() {
    let pipeline = Pipeline::new(config(8));
    let err = pipeline.set_concurrency(3).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidConcurrency { value: 3 }));
    assert_eq!(pipeline.concurrency().get(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_processing_frees_slot() {
    let temp = TempDir::new().unwrap();
    let paths = write_files(temp.path(), &[("a", "first"), ("b", "second")]);

    let engine = GatedEngine::new();
    let pipeline = Pipeline::with_engine(config(1), Arc::clone(&engine));
    let ids = pipeline.add_paths(&paths).added;
    assert_eq!(pipeline.processing()[0].id(), ids[0]);

    assert!(pipeline.cancel_processing(ids[0]));
    // The freed slot is refilled by the same call.
    assert_eq!(pipeline.processing()[0].id(), ids[1]);
    assert!(pipeline.pending().is_empty());
    assert!(!pipeline.cancel_processing(ids[0]));

    engine.open();
    pipeline.wait_idle().await;

    assert_eq!(paths_of(&pipeline.completed()), paths[1..]);
    assert!(pipeline.record(ids[0]).is_none());
    assert!(pipeline.failed().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_path_can_be_added_again() {
    let temp = TempDir::new().unwrap();
    let paths = write_files(temp.path(), &[("a", "first")]);

    let engine = GatedEngine::new();
    let pipeline = Pipeline::with_engine(config(1), Arc::clone(&engine));
    let first = pipeline.add_paths(&paths).added[0];
    pipeline.cancel_processing(first);

    let again = pipeline.add_paths(&paths);
    assert_eq!(again.added.len(), 1);
    assert_ne!(again.added[0], first);

    engine.open();
    pipeline.wait_idle().await;
    assert_eq!(pipeline.completed().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_re_adding_tracked_paths_is_noop() {
    let temp = TempDir::new().unwrap();
    let paths = write_files(temp.path(), &[("a", "1"), ("b", "2")]);

    let engine = GatedEngine::new();
    let pipeline = Pipeline::with_engine(config(1), Arc::clone(&engine));
    assert_eq!(pipeline.add_paths(&paths).added.len(), 2);

    // One processing, one pending.
    let again = pipeline.add_paths(&paths);
    assert!(again.added.is_empty());
    assert_eq!(again.skipped, 2);

    let candidates = vec![Candidate {
        path: paths[1].clone(),
        size: 1,
    }];
    assert!(pipeline.enqueue(candidates).is_empty());

    engine.open();
    pipeline.wait_idle().await;

    // Completed paths are tracked too.
    assert!(pipeline.add_paths(&[temp.path()]).added.is_empty());
    assert_eq!(pipeline.completed().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_aliased_paths_tracked_once() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("photos");
    fs::create_dir(&dir).unwrap();
    let paths = write_files(&dir, &[("only_copy.jpg", "jpeg bytes")]);
    let alias = dir.join("..").join("photos");

    let pipeline = Pipeline::new(config(2));
    let summary = pipeline.add_paths(&[dir.clone(), alias.clone()]);
    assert_eq!(summary.added.len(), 1);
    pipeline.wait_idle().await;

    // A later alias of a completed path is still recognised.
    assert!(pipeline.add_paths(&[alias.join("only_copy.jpg")]).added.is_empty());

    assert_eq!(paths_of(&pipeline.completed()), paths);
    assert_eq!(pipeline.completed()[0].marker(), None);
    assert_eq!(pipeline.select_duplicates(), 0);

    let report = pipeline.delete_selected(&hashsieve_pipeline::PermanentDeleter);
    assert_eq!(report.deleted_count(), 0);
    assert!(paths[0].exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_add_paths_on_blocking_thread() {
    let temp = TempDir::new().unwrap();
    let paths = write_files(temp.path(), &[("a", "1"), ("b", "2"), ("c", "3")]);
    let pipeline = Pipeline::new(config(2));
    let mut events = pipeline.subscribe();

    let worker = pipeline.clone();
    let inputs = vec![temp.path().to_path_buf()];
    let summary = tokio::task::spawn_blocking(move || worker.add_paths(&inputs))
        .await
        .unwrap();
    assert_eq!(summary.added.len(), 3);
    pipeline.wait_idle().await;

    // Every completion is already buffered once the pipeline is idle.
    let completed = drain_events(&mut events)
        .iter()
        .filter(|e| matches!(e.kind, EventKind::Completed { .. }))
        .count();
    assert_eq!(completed, paths.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_io_failure_is_isolated() {
    let temp = TempDir::new().unwrap();
    let paths = write_files(temp.path(), &[("a", "1"), ("b", "2"), ("c", "3")]);

    let engine = GatedEngine::new();
    let pipeline = Pipeline::with_engine(config(1), Arc::clone(&engine));
    let mut events = pipeline.subscribe();
    let ids = pipeline.add_paths(&paths).added;

    fs::remove_file(&paths[1]).unwrap();
    engine.open();
    pipeline.wait_idle().await;

    assert_eq!(paths_of(&pipeline.completed()), vec![paths[0].clone(), paths[2].clone()]);
    let failed = pipeline.failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].record.id(), ids[1]);
    assert_eq!(failed[0].record.stage(), Stage::Failed);
    assert!(failed[0].record.digest().is_none());
    assert_eq!(failed[0].failure.kind, FailureKind::NotFound);

    let events = drain_events(&mut events);
    assert!(events
        .iter()
        .any(|e| matches!(e.kind, EventKind::Failed { id, .. } if id == ids[1])));

    // Retrying a failed path drops the stale failure.
    fs::write(&paths[1], "2").unwrap();
    let retry = pipeline.add_paths(&paths[1..2]);
    assert_eq!(retry.added.len(), 1);
    assert!(pipeline.failed().is_empty());
    pipeline.wait_idle().await;
    assert_eq!(pipeline.completed().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_input_is_a_warning() {
    let temp = TempDir::new().unwrap();
    let pipeline = Pipeline::new(config(2));

    let summary = pipeline.add_paths(&[temp.path().join("nope")]);
    assert!(summary.added.is_empty());
    assert_eq!(summary.warnings.len(), 1);
    assert!(pipeline.counts().is_idle());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_algorithm_captured_at_dispatch() {
    let temp = TempDir::new().unwrap();
    let paths = write_files(temp.path(), &[("a", "same"), ("b", "same")]);

    let engine = GatedEngine::new();
    let pipeline = Pipeline::with_engine(config(1), Arc::clone(&engine));
    pipeline.set_algorithm(HashAlgorithm::Md5).unwrap();
    pipeline.add_paths(&paths);

    pipeline.set_algorithm(HashAlgorithm::Sha256).unwrap();
    assert_eq!(pipeline.processing()[0].algorithm(), HashAlgorithm::Md5);

    engine.open();
    pipeline.wait_idle().await;

    let completed = pipeline.completed();
    assert_eq!(completed[0].algorithm(), HashAlgorithm::Md5);
    assert_eq!(completed[0].digest().unwrap().len(), 32);
    assert_eq!(completed[1].algorithm(), HashAlgorithm::Sha256);
    assert_eq!(completed[1].digest().unwrap().len(), 64);

    // Same bytes under different algorithms are not duplicates.
    assert!(completed.iter().all(|r| r.marker().is_none()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_none_algorithm_cannot_be_selected() {
    let pipeline = Pipeline::new(PipelineConfig::default());
    let err = pipeline.set_algorithm(HashAlgorithm::None).unwrap_err();
    assert!(matches!(err, PipelineError::UnselectableAlgorithm { .. }));
    assert_eq!(pipeline.algorithm(), HashAlgorithm::Md5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remove_pending() {
    let temp = TempDir::new().unwrap();
    let paths = write_files(temp.path(), &[("a", "1"), ("b", "2"), ("c", "3")]);

    let engine = GatedEngine::new();
    let pipeline = Pipeline::with_engine(config(1), Arc::clone(&engine));
    let ids = pipeline.add_paths(&paths).added;

    pipeline.remove_pending(ids[1]).unwrap();
    assert_eq!(paths_of(&pipeline.pending()), paths[2..]);

    // Only pending records can be removed this way.
    let err = pipeline.remove_pending(ids[0]).unwrap_err();
    assert!(matches!(err, PipelineError::UnknownRecord { .. }));

    engine.open();
    pipeline.wait_idle().await;
    assert_eq!(
        paths_of(&pipeline.completed()),
        vec![paths[0].clone(), paths[2].clone()]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_all() {
    let temp = TempDir::new().unwrap();
    let paths = write_files(
        temp.path(),
        &[("1", "a"), ("2", "b"), ("3", "c"), ("4", "d"), ("5", "e")],
    );

    let engine = GatedEngine::new();
    let pipeline = Pipeline::with_engine(config(2), Arc::clone(&engine));
    pipeline.add_paths(&paths);

    assert_eq!(pipeline.cancel_all(), 5);
    assert!(pipeline.counts().is_idle());
    pipeline.wait_idle().await;

    // Let the cancelled computations wind down; their results are dropped.
    engine.open();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(pipeline.completed().is_empty());
    assert!(pipeline.failed().is_empty());
}
