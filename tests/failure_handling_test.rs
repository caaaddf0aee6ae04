//! Per-file failures, worker abort and systemic run failures.

mod common;

use common::{Fault, FaultyStore, RecordingObserver, memory_ledger, run_to_end, text_files};
use docindex::indexing::WorkerConfig;
use docindex::{
    Document, IndexStore, Ledger, MemoryStore, Resolution, ResolveError, Resolver, RunCoordinator,
    RunObserver, RunOutcome, RunPhase, RunStatus, StoreConnection, StoreError,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;

fn faulty_coordinator(store: &FaultyStore, root: &std::path::Path, threshold: usize) -> RunCoordinator {
    RunCoordinator::builder(Arc::new(store.clone()), memory_ledger())
        .data_roots([root])
        .workers(1)
        .worker_config(WorkerConfig {
            failure_threshold: threshold,
            resolve_timeout: None,
        })
        .build()
}

#[test]
fn test_worker_abandons_queue_after_consecutive_commit_failures() {
    let temp = text_files(10);
    let store = FaultyStore::new(Fault::Commit);
    let coordinator = faulty_coordinator(&store, temp.path(), 2);

    let outcome = run_to_end(&coordinator);

    // Failures 1 and 2 are tolerated, the third exceeds the threshold.
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.stats.failed, 3);
    assert_eq!(outcome.stats.aborted_workers, 1);
    assert_eq!(outcome.stats.processed(), 3);
    assert_eq!(store.inner.document_count(), 0);
    // Every failed commit tries to discard a partial document.
    assert_eq!(store.deletes.load(Ordering::SeqCst), 3);
}

#[test]
fn test_metadata_failure_removes_committed_document() {
    let temp = text_files(2);
    let store = FaultyStore::new(Fault::Metadata);
    let ledger = memory_ledger();
    let coordinator = RunCoordinator::builder(Arc::new(store.clone()), ledger.clone())
        .data_roots([temp.path()])
        .build();

    let outcome = run_to_end(&coordinator);

    assert_eq!(outcome.stats.failed, 2);
    assert_eq!(outcome.stats.aborted_workers, 0);
    assert_eq!(store.inner.document_count(), 0);
    assert_eq!(store.inner.mutations().adds, 2);
    assert!(ledger.is_empty());
}

struct Exploding;

impl Resolver for Exploding {
    fn name(&self) -> &str {
        "exploding"
    }

    fn priority(&self) -> f64 {
        1.0
    }

    fn can_resolve(&self, doc: &Document) -> bool {
        doc.path.to_string_lossy().ends_with("doc1.txt")
    }

    fn resolve(&self, doc: &Document) -> Result<Resolution, ResolveError> {
        Err(ResolveError::Failed {
            resolver: "exploding".to_string(),
            path: doc.path.clone(),
            reason: "malformed".to_string(),
        })
    }
}

#[test]
fn test_resolver_error_fails_only_that_file() {
    let temp = text_files(3);
    let store = MemoryStore::new();
    let ledger = memory_ledger();
    let coordinator = RunCoordinator::builder(Arc::new(store.clone()), ledger.clone())
        .data_roots([temp.path()])
        .workers(1)
        .resolver(Arc::new(Exploding))
        .resolver(Arc::new(docindex::TextResolver::new(["txt"]).with_priority(0.5)))
        .build();

    let outcome = run_to_end(&coordinator);

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.stats.failed, 1);
    assert_eq!(outcome.stats.added, 2);
    assert!(store.get(&temp.path().join("doc1.txt")).is_none());
    assert!(ledger.is_empty());

    // Failed files are picked up again by the next run.
    let retry = run_to_end(&coordinator);
    assert_eq!(retry.stats.failed, 1);
    assert_eq!(retry.stats.unchanged, 2);
}

struct Offline;

impl IndexStore for Offline {
    fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

#[test]
fn test_store_connect_failure_fails_run() {
    let temp = text_files(2);
    let observer = Arc::new(RecordingObserver::default());
    let coordinator = RunCoordinator::builder(Arc::new(Offline), memory_ledger())
        .data_roots([temp.path()])
        .build();
    coordinator.add_observer(observer.clone());

    let outcome = run_to_end(&coordinator);

    assert!(!outcome.was_cancelled());
    let reason = outcome.error().unwrap();
    assert!(reason.contains("Failed to open index connection"), "{reason}");
    assert!(reason.contains("connection refused"), "{reason}");
    assert_eq!(observer.finish_count(), 1);
    assert!(!coordinator.is_running());
}

/// Observer that panics on the first notification of the chosen kind.
struct Panicking {
    on_progress: bool,
}

impl RunObserver for Panicking {
    fn notify_start(&self, _total_files: u64, _total_bytes: u64) {
        if !self.on_progress {
            panic!("observer blew up at start");
        }
    }

    fn report_progress(&self, _percent: u8, _current_item_bytes: u64) {
        if self.on_progress {
            panic!("observer blew up mid run");
        }
    }

    fn notify_finish(&self, _outcome: &RunOutcome) {}
}

fn assert_recovers_from_panicking_observer(on_progress: bool, expected: &str) {
    let temp = text_files(3);
    let store = MemoryStore::new();
    let ledger = memory_ledger();
    let recorder = Arc::new(RecordingObserver::default());
    let coordinator = RunCoordinator::builder(Arc::new(store.clone()), ledger.clone())
        .data_roots([temp.path()])
        .workers(1)
        .build();
    coordinator.add_observer(Arc::new(Panicking { on_progress }));
    coordinator.add_observer(recorder.clone());

    let outcome = run_to_end(&coordinator);

    let reason = outcome.error().unwrap();
    assert!(reason.contains("run panicked"), "{reason}");
    assert!(reason.contains(expected), "{reason}");
    assert_eq!(recorder.finish_count(), 1);
    assert!(!coordinator.is_running());
    assert_eq!(coordinator.status().phase, RunPhase::Idle);

    // The coordinator keeps accepting runs.
    assert!(coordinator.start_update());
    coordinator.wait();
    assert_eq!(recorder.finish_count(), 2);
}

#[test]
fn test_observer_panic_at_start_fails_run_and_returns_to_idle() {
    assert_recovers_from_panicking_observer(false, "observer blew up at start");
}

#[test]
fn test_observer_panic_during_progress_fails_run_and_returns_to_idle() {
    assert_recovers_from_panicking_observer(true, "observer blew up mid run");
}

struct PanicsOnFinish;

impl RunObserver for PanicsOnFinish {
    fn notify_finish(&self, _outcome: &RunOutcome) {
        panic!("finish handler blew up");
    }
}

#[test]
fn test_finish_panic_still_notifies_other_observers() {
    let temp = text_files(2);
    let store = MemoryStore::new();
    let recorder = Arc::new(RecordingObserver::default());
    let coordinator = RunCoordinator::builder(Arc::new(store.clone()), memory_ledger())
        .data_roots([temp.path()])
        .build();
    coordinator.add_observer(Arc::new(PanicsOnFinish));
    coordinator.add_observer(recorder.clone());

    let outcome = run_to_end(&coordinator);

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(recorder.finish_count(), 1);
    assert!(!coordinator.is_running());
    assert_eq!(run_to_end(&coordinator).stats.unchanged, 2);
}
