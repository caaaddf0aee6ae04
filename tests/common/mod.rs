//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use crossbeam_channel::Receiver;
use docindex::{
    Document, IndexStore, Ledger, MemoryLedger, MemoryStore, Resolution, ResolveError, Resolver,
    RunCoordinator, RunObserver, RunOutcome, StoreConnection, StoreError,
};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tempfile::TempDir;

/// Write `count` text files `doc{i}.txt` below a fresh temp dir.
pub fn text_files(count: usize) -> TempDir {
    let temp = TempDir::new().unwrap();
    for i in 0..count {
        fs::write(
            temp.path().join(format!("doc{i}.txt")),
            format!("document {i}\nline two"),
        )
        .unwrap();
    }
    temp
}

pub fn coordinator(
    root: &Path,
    store: &MemoryStore,
    ledger: Arc<dyn Ledger>,
    workers: usize,
) -> RunCoordinator {
    RunCoordinator::builder(Arc::new(store.clone()), ledger)
        .data_roots([root])
        .workers(workers)
        .build()
}

pub fn run_to_end(coordinator: &RunCoordinator) -> RunOutcome {
    assert!(coordinator.start_update(), "run was rejected");
    coordinator.wait();
    coordinator.last_outcome().expect("finished run has an outcome")
}

/// Records every notification it receives.
#[derive(Default)]
pub struct RecordingObserver {
    pub starts: Mutex<Vec<(u64, u64)>>,
    pub progress: Mutex<Vec<u8>>,
    pub finishes: Mutex<Vec<RunOutcome>>,
}

impl RecordingObserver {
    pub fn finish_count(&self) -> usize {
        self.finishes.lock().len()
    }

    pub fn last_finish(&self) -> RunOutcome {
        self.finishes.lock().last().cloned().expect("no finish notification")
    }
}

impl RunObserver for RecordingObserver {
    fn notify_start(&self, total_files: u64, total_bytes: u64) {
        self.starts.lock().push((total_files, total_bytes));
    }

    fn report_progress(&self, percent: u8, _current_item_bytes: u64) {
        self.progress.lock().push(percent);
    }

    fn notify_finish(&self, outcome: &RunOutcome) {
        self.finishes.lock().push(outcome.clone());
    }
}

/// Accepts every `.txt` file and tags its output with its own name.
pub struct TaggingResolver {
    pub name: String,
    pub priority: f64,
}

impl TaggingResolver {
    pub fn new(name: &str, priority: f64) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            priority,
        })
    }
}

impl Resolver for TaggingResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> f64 {
        self.priority
    }

    fn can_resolve(&self, doc: &Document) -> bool {
        doc.extension().as_deref() == Some("txt")
    }

    fn resolve(&self, doc: &Document) -> Result<Resolution, ResolveError> {
        Ok(Resolution::new(vec![format!("{}:{}", self.name, doc.path.display())])
            .with_field("resolver", vec![self.name.clone()]))
    }
}

/// Blocks every resolve until the gate sender is dropped.
pub struct GatedResolver {
    pub gate: Receiver<()>,
    pub entered: crossbeam_channel::Sender<PathBuf>,
}

impl Resolver for GatedResolver {
    fn name(&self) -> &str {
        "gated"
    }

    fn priority(&self) -> f64 {
        1.0
    }

    fn can_resolve(&self, _doc: &Document) -> bool {
        true
    }

    fn resolve(&self, doc: &Document) -> Result<Resolution, ResolveError> {
        let _ = self.entered.send(doc.path.clone());
        let _ = self.gate.recv();
        Ok(Resolution::new(vec!["released".to_string()]))
    }
}

/// Calls `cancel_update` on the coordinator once `cancel_after` files
/// have been resolved.
pub struct CancellingResolver {
    pub coordinator: OnceLock<RunCoordinator>,
    pub cancel_after: usize,
    /// Held across count and cancel so no other resolve starts in between.
    pub resolved: Mutex<usize>,
}

impl CancellingResolver {
    pub fn new(cancel_after: usize) -> Arc<Self> {
        Arc::new(Self {
            coordinator: OnceLock::new(),
            cancel_after,
            resolved: Mutex::new(0),
        })
    }
}

impl Resolver for CancellingResolver {
    fn name(&self) -> &str {
        "cancelling"
    }

    fn priority(&self) -> f64 {
        1.0
    }

    fn can_resolve(&self, _doc: &Document) -> bool {
        true
    }

    fn resolve(&self, _doc: &Document) -> Result<Resolution, ResolveError> {
        let mut resolved = self.resolved.lock();
        *resolved += 1;
        if *resolved == self.cancel_after {
            if let Some(coordinator) = self.coordinator.get() {
                coordinator.cancel_update();
            }
        }
        Ok(Resolution::new(vec!["content".to_string()]))
    }
}

/// Which store operation a [`FaultyStore`] breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Commit,
    Metadata,
}

/// Wraps a [`MemoryStore`] and fails one kind of operation.
#[derive(Clone)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    pub fault: Fault,
    pub deletes: Arc<AtomicUsize>,
}

impl FaultyStore {
    pub fn new(fault: Fault) -> Self {
        Self {
            inner: MemoryStore::new(),
            fault,
            deletes: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl IndexStore for FaultyStore {
    fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        Ok(Box::new(FaultyConnection {
            inner: self.inner.connect()?,
            fault: self.fault,
            deletes: Arc::clone(&self.deletes),
        }))
    }
}

struct FaultyConnection {
    inner: Box<dyn StoreConnection>,
    fault: Fault,
    deletes: Arc<AtomicUsize>,
}

impl StoreConnection for FaultyConnection {
    fn document_exists(&self, path: &Path) -> Result<bool, StoreError> {
        self.inner.document_exists(path)
    }

    fn document_exists_with_checksum(
        &self,
        checksum: docindex::Checksum,
        path: &Path,
    ) -> Result<bool, StoreError> {
        self.inner.document_exists_with_checksum(checksum, path)
    }

    fn get_document(&self, path: &Path) -> Result<Option<Document>, StoreError> {
        self.inner.get_document(path)
    }

    fn add_document(&mut self, doc: &Document) -> Result<(), StoreError> {
        if self.fault == Fault::Commit {
            return Err(StoreError::Unavailable("index offline".to_string()));
        }
        self.inner.add_document(doc)
    }

    fn update_document(&mut self, doc: &Document) -> Result<(), StoreError> {
        if self.fault == Fault::Commit {
            return Err(StoreError::Unavailable("index offline".to_string()));
        }
        self.inner.update_document(doc)
    }

    fn delete(&mut self, path: &Path) -> Result<bool, StoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(path)
    }

    fn add_metadata(&mut self, path: &Path, field: &str, values: &[String]) -> Result<(), StoreError> {
        self.inner.add_metadata(path, field, values)
    }

    fn submit_changes(&mut self) -> Result<(), StoreError> {
        if self.fault == Fault::Metadata {
            return Err(StoreError::Unavailable("metadata service offline".to_string()));
        }
        self.inner.submit_changes()
    }
}

pub fn memory_ledger() -> Arc<MemoryLedger> {
    Arc::new(MemoryLedger::new())
}
