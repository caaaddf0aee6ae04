//! Run coordinator.
//!
//! Owns the single "a run is in progress" state of the process:
//!
//! ```text
//! Idle → Preparing → Running → {Completed, Cancelled, Failed} → Idle
//!          │            │
//!          │            └─ one thread per partition, events → aggregator
//!          └─ ledger cleanup, discovery, partitioning
//! ```
//!
//! [`RunCoordinator::start_update`] returns as soon as the run thread is
//! spawned. Workers report every finished file over a channel; the run
//! thread drains that channel in a single aggregator loop, which is the only
//! place observers are called from. Each run ends with exactly one
//! [`RunObserver::notify_finish`].

use crossbeam_channel::unbounded;
use parking_lot::{Condvar, Mutex, RwLock};
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use super::distributor::{WorkDistributor, WorkQueue};
use super::error::{IndexError, IndexResult};
use super::events::{RunObserver, RunOutcome, RunStats, RunStatus, percent_complete};
use super::worker::{IndexWorker, WorkerConfig, WorkerEvent, WorkerReport};
use crate::checksum::{ChecksumProvider, Crc32Checksum};
use crate::config::Settings;
use crate::ledger::Ledger;
use crate::logging::error_chain;
use crate::resolver::{Resolver, ResolverChain};
use crate::store::{IndexStore, StoreConnection};
use crate::types::FileMeta;
use crate::walker::{FileLister, FsWalker};

/// Lifecycle phase of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    /// Cleanup, discovery and partitioning.
    Preparing,
    /// Workers are draining their queues.
    Running,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Running => "running",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorStatus {
    pub phase: RunPhase,
    pub total_files: u64,
    pub total_bytes: u64,
    pub finished_files: u64,
    pub percent: u8,
    pub cancel_requested: bool,
}

/// Run counters backing [`RunCoordinator::wait`].
#[derive(Debug, Default)]
struct RunCount {
    started: u64,
    finished: u64,
}

#[derive(Debug, Default)]
struct Progress {
    total_files: u64,
    total_bytes: u64,
    finished_files: u64,
}

struct Inner {
    store: Arc<dyn IndexStore>,
    ledger: Arc<dyn Ledger>,
    lister: Arc<dyn FileLister>,
    checksum: Arc<dyn ChecksumProvider>,
    chain: RwLock<Arc<ResolverChain>>,
    data_roots: Vec<PathBuf>,
    worker_count: usize,
    worker_config: WorkerConfig,

    /// Coarse lock for start, stop and cleanup transitions.
    phase: Mutex<RunPhase>,
    cancel: AtomicBool,
    /// Held only for counter updates.
    progress: Mutex<Progress>,
    observers: RwLock<Vec<Arc<dyn RunObserver>>>,
    last_outcome: Mutex<Option<RunOutcome>>,
    runs: Mutex<RunCount>,
    run_done: Condvar,
}

/// Handle on the process-wide indexing state. Clones share the same state.
#[derive(Clone)]
pub struct RunCoordinator {
    inner: Arc<Inner>,
}

/// Builder for [`RunCoordinator`].
pub struct CoordinatorBuilder {
    store: Arc<dyn IndexStore>,
    ledger: Arc<dyn Ledger>,
    lister: Option<Arc<dyn FileLister>>,
    checksum: Arc<dyn ChecksumProvider>,
    chain: ResolverChain,
    data_roots: Vec<PathBuf>,
    ignore_patterns: Vec<String>,
    worker_count: usize,
    worker_config: WorkerConfig,
}

impl CoordinatorBuilder {
    /// Take data roots, worker count, fallback and worker tuning from settings.
    pub fn settings(mut self, settings: &Settings) -> Self {
        let indexing = &settings.indexing;
        self.data_roots = indexing
            .data_roots
            .iter()
            .map(|root| settings.resolve_path(root))
            .collect();
        self.ignore_patterns = indexing.ignore_patterns.clone();
        self.worker_count = indexing.effective_workers();
        self.worker_config = WorkerConfig {
            failure_threshold: indexing.failure_threshold,
            resolve_timeout: indexing.resolve_timeout(),
        };
        self.chain.set_default_fallback(indexing.use_default_fallback);
        self
    }

    pub fn data_roots<I, P>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.data_roots = roots.into_iter().map(Into::into).collect();
        self
    }

    pub fn workers(mut self, count: usize) -> Self {
        self.worker_count = count.max(1);
        self
    }

    pub fn worker_config(mut self, config: WorkerConfig) -> Self {
        self.worker_config = config;
        self
    }

    pub fn default_fallback(mut self, enabled: bool) -> Self {
        self.chain.set_default_fallback(enabled);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.chain.register(resolver);
        self
    }

    /// Replace the file-system walker.
    pub fn lister(mut self, lister: Arc<dyn FileLister>) -> Self {
        self.lister = Some(lister);
        self
    }

    pub fn checksum(mut self, checksum: Arc<dyn ChecksumProvider>) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn build(self) -> RunCoordinator {
        let lister = self.lister.unwrap_or_else(|| {
            Arc::new(FsWalker::new().with_ignore_patterns(self.ignore_patterns))
        });

        RunCoordinator {
            inner: Arc::new(Inner {
                store: self.store,
                ledger: self.ledger,
                lister,
                checksum: self.checksum,
                chain: RwLock::new(Arc::new(self.chain)),
                data_roots: self.data_roots,
                worker_count: self.worker_count,
                worker_config: self.worker_config,
                phase: Mutex::new(RunPhase::Idle),
                cancel: AtomicBool::new(false),
                progress: Mutex::new(Progress::default()),
                observers: RwLock::new(Vec::new()),
                last_outcome: Mutex::new(None),
                runs: Mutex::new(RunCount::default()),
                run_done: Condvar::new(),
            }),
        }
    }
}

impl RunCoordinator {
    pub fn builder(store: Arc<dyn IndexStore>, ledger: Arc<dyn Ledger>) -> CoordinatorBuilder {
        CoordinatorBuilder {
            store,
            ledger,
            lister: None,
            checksum: Arc::new(Crc32Checksum),
            chain: ResolverChain::new().with_default_fallback(true),
            data_roots: Vec::new(),
            ignore_patterns: Vec::new(),
            worker_count: 1,
            worker_config: WorkerConfig::default(),
        }
    }

    pub fn from_settings(
        settings: &Settings,
        store: Arc<dyn IndexStore>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self::builder(store, ledger).settings(settings).build()
    }

    /// Add a resolver. Takes effect from the next run on.
    pub fn register_resolver(&self, resolver: Arc<dyn Resolver>) {
        let mut chain = self.inner.chain.write();
        Arc::make_mut(&mut *chain).register(resolver);
        crate::debug_event!("coordinator", "resolver registered", "{:?}", chain.names());
    }

    pub fn set_default_fallback(&self, enabled: bool) {
        let mut chain = self.inner.chain.write();
        Arc::make_mut(&mut *chain).set_default_fallback(enabled);
    }

    pub fn add_observer(&self, observer: Arc<dyn RunObserver>) {
        self.inner.observers.write().push(observer);
    }

    pub fn worker_count(&self) -> usize {
        self.inner.worker_count
    }

    pub fn is_running(&self) -> bool {
        *self.inner.phase.lock() != RunPhase::Idle
    }

    /// Start a run in the background.
    ///
    /// Returns `false` without side effects when a run is already active.
    pub fn start_update(&self) -> bool {
        let mut phase = self.inner.phase.lock();
        if *phase != RunPhase::Idle {
            crate::debug_event!("coordinator", "start rejected", "run already {}", *phase);
            return false;
        }

        *phase = RunPhase::Preparing;
        self.inner.cancel.store(false, Ordering::Release);
        *self.inner.progress.lock() = Progress::default();
        self.inner.runs.lock().started += 1;

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("index-run".to_string())
            .spawn(move || inner.run());

        match spawned {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(target: "coordinator", "[coordinator] failed to start run: {e}");
                *phase = RunPhase::Idle;
                drop(phase);
                self.inner.mark_finished();
                false
            }
        }
    }

    /// Ask the current run to stop at the next file boundary.
    pub fn cancel_update(&self) {
        let phase = self.inner.phase.lock();
        if *phase != RunPhase::Idle {
            self.inner.cancel.store(true, Ordering::Release);
            crate::log_event!("coordinator", "cancel requested");
        }
    }

    /// Purge documents left behind by interrupted work.
    ///
    /// Every ledger entry's document is deleted from the index and the entry
    /// is cleared once the deletes are flushed. Returns the number of cleared
    /// entries.
    pub fn cleanup(&self) -> IndexResult<usize> {
        let phase = self.inner.phase.lock();
        if *phase != RunPhase::Idle {
            return Err(IndexError::RunInProgress);
        }
        let cleared = self.inner.purge_ledger()?;
        drop(phase);
        Ok(cleared)
    }

    pub fn status(&self) -> CoordinatorStatus {
        let phase = self.inner.phase.lock();
        let progress = self.inner.progress.lock();
        CoordinatorStatus {
            phase: *phase,
            total_files: progress.total_files,
            total_bytes: progress.total_bytes,
            finished_files: progress.finished_files,
            percent: percent_complete(progress.finished_files, progress.total_files),
            cancel_requested: self.inner.cancel.load(Ordering::Acquire),
        }
    }

    /// Outcome of the most recent finished run.
    pub fn last_outcome(&self) -> Option<RunOutcome> {
        self.inner.last_outcome.lock().clone()
    }

    /// Block until every run started before this call has finished and
    /// notified its observers. Any number of threads may wait at once.
    ///
    /// Must not be called from an observer.
    pub fn wait(&self) {
        let mut runs = self.inner.runs.lock();
        let target = runs.started;
        while runs.finished < target {
            self.inner.run_done.wait(&mut runs);
        }
    }
}

impl Inner {
    fn run(self: Arc<Self>) {
        let started = Instant::now();
        let mut stats = RunStats::default();

        let executed = panic::catch_unwind(AssertUnwindSafe(|| self.execute(&mut stats)));
        let status = match executed {
            Ok(Ok(())) if self.cancel.load(Ordering::Acquire) => RunStatus::Cancelled,
            Ok(Ok(())) => RunStatus::Completed,
            Ok(Err(e)) => RunStatus::Failed(error_chain(&e)),
            Err(payload) => {
                let reason = format!("run panicked: {}", panic_message(payload.as_ref()));
                tracing::error!(target: "coordinator", "[coordinator] {reason}");
                RunStatus::Failed(reason)
            }
        };

        let outcome = {
            let progress = self.progress.lock();
            RunOutcome {
                status,
                total_files: progress.total_files,
                total_bytes: progress.total_bytes,
                stats,
                elapsed: started.elapsed(),
            }
        };
        self.finish(outcome);
    }

    fn execute(&self, stats: &mut RunStats) -> IndexResult<()> {
        self.purge_ledger()?;

        let chain = self.chain.read().clone();
        let files = self.discover(&chain)?;

        let total_files = files.len() as u64;
        let total_bytes: u64 = files.iter().map(|f| f.size).sum();
        {
            let mut progress = self.progress.lock();
            progress.total_files = total_files;
            progress.total_bytes = total_bytes;
        }

        if self.cancel.load(Ordering::Acquire) {
            return Ok(());
        }

        let partitions = if self.worker_count == 1 {
            vec![WorkDistributor::single(files)]
        } else {
            WorkDistributor::partition(files, self.worker_count, &mut rand::rng())
        };

        let connections = partitions
            .iter()
            .map(|_| self.store.connect())
            .collect::<Result<Vec<_>, _>>()
            .map_err(IndexError::Connect)?;

        crate::log_event!(
            "coordinator",
            "starting workers",
            "{total_files} files ({total_bytes} bytes) across {} workers",
            partitions.len()
        );
        let observers = self.observers();
        for observer in &observers {
            observer.notify_start(total_files, total_bytes);
        }

        *self.phase.lock() = RunPhase::Running;

        let queues = partitions.into_iter().map(|p| p.queue);
        self.run_workers(&chain, queues.zip(connections).collect(), &observers, stats)?;

        self.store.flush().map_err(IndexError::Flush)
    }

    /// Spawn one thread per queue and aggregate their events until all stop.
    fn run_workers(
        &self,
        chain: &Arc<ResolverChain>,
        work: Vec<(WorkQueue, Box<dyn StoreConnection>)>,
        observers: &[Arc<dyn RunObserver>],
        stats: &mut RunStats,
    ) -> IndexResult<()> {
        let (event_tx, event_rx) = unbounded();
        let mut spawn_error = None;

        let reports = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(work.len());

            for (id, (queue, conn)) in work.into_iter().enumerate() {
                let worker = IndexWorker::new(
                    id,
                    conn,
                    Arc::clone(chain),
                    Arc::clone(&self.checksum),
                    Arc::clone(&self.ledger),
                    self.worker_config,
                );
                let tx = event_tx.clone();
                let cancel = &self.cancel;

                let spawned = thread::Builder::new()
                    .name(format!("index-worker-{id}"))
                    .spawn_scoped(scope, move || {
                        let report = worker.run(queue, cancel, &tx);
                        let _ = tx.send(WorkerEvent::Done(report));
                    });

                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        // Workers already started stop at their next file.
                        self.cancel.store(true, Ordering::Release);
                        spawn_error = Some(IndexError::Spawn(e.to_string()));
                        break;
                    }
                }
            }
            drop(event_tx);

            let mut reports = Vec::with_capacity(handles.len());
            for event in event_rx.iter() {
                match event {
                    WorkerEvent::FileFinished { bytes, .. } => {
                        let percent = {
                            let mut progress = self.progress.lock();
                            progress.finished_files += 1;
                            percent_complete(progress.finished_files, progress.total_files)
                        };
                        for observer in observers {
                            observer.report_progress(percent, bytes);
                        }
                    }
                    WorkerEvent::Done(report) => {
                        crate::debug_event!(
                            "coordinator",
                            "worker done",
                            "worker {} processed {}, {} left",
                            report.worker,
                            report.stats.processed(),
                            report.remaining
                        );
                        reports.push(report);
                    }
                }
            }

            for (id, handle) in handles.into_iter().enumerate() {
                if handle.join().is_err() {
                    tracing::error!(target: "coordinator", "[coordinator] worker {id} panicked");
                    reports.push(WorkerReport {
                        worker: id,
                        aborted: true,
                        ..WorkerReport::default()
                    });
                }
            }
            reports
        });

        for report in &reports {
            stats.merge(&report.stats);
            if report.aborted {
                stats.aborted_workers += 1;
            }
        }

        match spawn_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Walk every data root, keep the files some resolver accepts.
    fn discover(&self, chain: &ResolverChain) -> IndexResult<Vec<FileMeta>> {
        if self.data_roots.is_empty() {
            return Err(IndexError::NoDataRoots);
        }

        let mut seen = HashSet::new();
        let mut files = Vec::new();
        let mut filtered = 0usize;

        for root in &self.data_roots {
            for file in self.lister.list_files(root)? {
                if !chain.is_empty() && !chain.accepts(&file.path) {
                    filtered += 1;
                    continue;
                }
                if seen.insert(file.path.clone()) {
                    files.push(file);
                }
            }
        }

        crate::debug_event!(
            "coordinator",
            "discovered",
            "{} files in {} roots, {filtered} without a resolver",
            files.len(),
            self.data_roots.len()
        );
        Ok(files)
    }

    /// Delete the documents of all ledger entries, make the deletes durable,
    /// then clear the entries.
    fn purge_ledger(&self) -> IndexResult<usize> {
        let entries = self.ledger.all();
        if entries.is_empty() {
            return Ok(0);
        }

        tracing::warn!(
            target: "coordinator",
            "[coordinator] purging {} interrupted documents",
            entries.len()
        );

        let mut conn = self.store.connect().map_err(IndexError::Connect)?;
        let mut purged = Vec::with_capacity(entries.len());
        for path in entries {
            match conn.delete(&path) {
                Ok(existed) => {
                    crate::debug_event!(
                        "coordinator",
                        "purged",
                        "{} (indexed: {existed})",
                        path.display()
                    );
                    purged.push(path);
                }
                Err(e) => {
                    // The entry stays so the next cleanup tries again.
                    tracing::warn!(
                        target: "coordinator",
                        "[coordinator] failed to purge {}: {}",
                        path.display(),
                        error_chain(&e)
                    );
                }
            }
        }

        // Entries must outlive the documents they guard on disk.
        self.store.flush().map_err(IndexError::Flush)?;
        for path in &purged {
            self.ledger.remove(path)?;
        }
        Ok(purged.len())
    }

    fn observers(&self) -> Vec<Arc<dyn RunObserver>> {
        self.observers.read().clone()
    }

    fn finish(&self, outcome: RunOutcome) {
        *self.last_outcome.lock() = Some(outcome.clone());
        {
            let mut phase = self.phase.lock();
            *phase = RunPhase::Idle;
            self.cancel.store(false, Ordering::Release);
        }

        for observer in self.observers() {
            let notified =
                panic::catch_unwind(AssertUnwindSafe(|| observer.notify_finish(&outcome)));
            if let Err(payload) = notified {
                tracing::error!(
                    target: "coordinator",
                    "[coordinator] observer panicked in notify_finish: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
        self.mark_finished();
    }

    fn mark_finished(&self) {
        self.runs.lock().finished += 1;
        self.run_done.notify_all();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
