//! Index worker: drains one private queue against its own store connection.
//!
//! Per file: checksum, classify, ledger add, resolve, commit, metadata,
//! ledger remove. The ledger entry brackets every index mutation so an
//! interrupted file is always visible to crash recovery.

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use super::detector::ChangeDetector;
use super::distributor::WorkQueue;
use super::error::{IndexError, IndexResult};
use super::events::{FileOutcome, RunStats};
use crate::checksum::ChecksumProvider;
use crate::ledger::Ledger;
use crate::logging::error_chain;
use crate::resolver::{ChainOutcome, ResolverChain};
use crate::store::StoreConnection;
use crate::types::{Checksum, Classification, Document, FileMeta};

/// Worker tuning shared by all workers of a run.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// A worker abandons its queue after more than this many consecutive
    /// commit failures.
    pub failure_threshold: usize,
    /// Upper bound for resolving one file.
    pub resolve_timeout: Option<Duration>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            resolve_timeout: None,
        }
    }
}

/// Messages from workers to the coordinator's aggregator loop.
#[derive(Debug)]
pub enum WorkerEvent {
    /// A file reached a terminal state (success or handled failure).
    FileFinished { worker: usize, bytes: u64 },
    /// The worker has stopped.
    Done(WorkerReport),
}

/// Final report of one worker.
#[derive(Debug, Clone, Default)]
pub struct WorkerReport {
    pub worker: usize,
    pub stats: RunStats,
    /// Files left in the queue (cancelled or aborted).
    pub remaining: usize,
    pub aborted: bool,
}

pub struct IndexWorker {
    id: usize,
    conn: Box<dyn StoreConnection>,
    chain: Arc<ResolverChain>,
    checksum: Arc<dyn ChecksumProvider>,
    ledger: Arc<dyn Ledger>,
    config: WorkerConfig,
}

impl IndexWorker {
    pub fn new(
        id: usize,
        conn: Box<dyn StoreConnection>,
        chain: Arc<ResolverChain>,
        checksum: Arc<dyn ChecksumProvider>,
        ledger: Arc<dyn Ledger>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            id,
            conn,
            chain,
            checksum,
            ledger,
            config,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Drain `queue` until it is empty, cancellation is requested, or too
    /// many commits failed in a row.
    pub fn run(
        mut self,
        mut queue: WorkQueue,
        cancel: &AtomicBool,
        events: &Sender<WorkerEvent>,
    ) -> WorkerReport {
        let mut stats = RunStats::default();
        let mut consecutive_failures = 0usize;
        let mut aborted = false;

        crate::debug_event!("worker", "started", "worker {} with {} files", self.id, queue.len());

        while !cancel.load(Ordering::Acquire) {
            let Some(item) = queue.pop_front() else {
                break;
            };

            match self.process_file(&item) {
                Ok(outcome) => {
                    stats.record(outcome);
                    consecutive_failures = 0;
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(
                        target: "worker",
                        "[worker {}] {}",
                        self.id,
                        error_chain(&e)
                    );
                    if e.is_commit_failure() {
                        consecutive_failures += 1;
                        if consecutive_failures > self.config.failure_threshold {
                            aborted = true;
                        }
                    }
                }
            }

            let _ = events.send(WorkerEvent::FileFinished {
                worker: self.id,
                bytes: item.size,
            });

            if aborted {
                tracing::error!(
                    target: "worker",
                    "[worker {}] {consecutive_failures} consecutive commit failures, abandoning {} queued files",
                    self.id,
                    queue.len()
                );
                break;
            }
        }

        if cancel.load(Ordering::Acquire) && !queue.is_empty() {
            crate::debug_event!(
                "worker",
                "cancelled",
                "worker {} leaves {} files for the next run",
                self.id,
                queue.len()
            );
        }

        WorkerReport {
            worker: self.id,
            stats,
            remaining: queue.len(),
            aborted,
        }
    }

    /// Bring the index up to date for one file.
    pub fn process_file(&mut self, item: &FileMeta) -> IndexResult<FileOutcome> {
        let path = item.path.as_path();

        let checksum = self
            .checksum
            .checksum(path)
            .map_err(|source| IndexError::Checksum {
                path: path.to_path_buf(),
                source,
            })?;

        let classification = ChangeDetector::classify(self.conn.as_ref(), path, checksum)
            .map_err(|source| IndexError::Lookup {
                path: path.to_path_buf(),
                source,
            })?;
        if classification == Classification::Unchanged {
            return Ok(FileOutcome::Unchanged);
        }

        self.ledger.add(path)?;
        let result = self.index_file(path, checksum, classification);
        let removed = self.ledger.remove(path);

        let outcome = result?;
        removed?;
        Ok(outcome)
    }

    fn index_file(
        &mut self,
        path: &Path,
        checksum: Checksum,
        classification: Classification,
    ) -> IndexResult<FileOutcome> {
        let is_update = classification == Classification::Changed;

        let doc = if is_update {
            self.conn
                .get_document(path)
                .map_err(|source| IndexError::Lookup {
                    path: path.to_path_buf(),
                    source,
                })?
                .map(|mut existing| {
                    existing.checksum = checksum;
                    existing.data.clear();
                    existing.metadata.clear();
                    existing.has_data = false;
                    existing
                })
                .unwrap_or_else(|| Document::new(path, checksum))
        } else {
            Document::new(path, checksum)
        };

        let (doc, outcome) = self.resolve(doc)?;
        if outcome == ChainOutcome::Unresolved {
            return Ok(FileOutcome::Skipped);
        }
        if let ChainOutcome::Resolved { resolver } = &outcome {
            crate::debug_event!("worker", "resolved", "{} by {resolver}", path.display());
        }

        let committed = if is_update {
            self.conn.update_document(&doc)
        } else {
            self.conn.add_document(&doc)
        };
        if let Err(source) = committed {
            self.discard_partial(path);
            return Err(IndexError::Commit {
                path: path.to_path_buf(),
                source,
            });
        }

        if let Err(source) = self.submit_metadata(&doc) {
            self.discard_partial(path);
            return Err(IndexError::Metadata {
                path: path.to_path_buf(),
                source,
            });
        }

        Ok(if is_update {
            FileOutcome::Updated
        } else {
            FileOutcome::Added
        })
    }

    fn submit_metadata(&mut self, doc: &Document) -> crate::store::StoreResult<()> {
        for (field, values) in &doc.metadata {
            self.conn.add_metadata(&doc.path, field, values)?;
        }
        self.conn.submit_changes()
    }

    /// Remove whatever a failed commit may have left for `path`.
    fn discard_partial(&mut self, path: &Path) {
        if let Err(e) = self.conn.delete(path) {
            tracing::warn!(
                target: "worker",
                "[worker {}] failed to discard partial document {}: {}",
                self.id,
                path.display(),
                error_chain(&e)
            );
        }
    }

    fn resolve(&self, doc: Document) -> IndexResult<(Document, ChainOutcome)> {
        let Some(timeout) = self.config.resolve_timeout else {
            let mut doc = doc;
            let outcome = self
                .chain
                .resolve(&mut doc)
                .map_err(|source| IndexError::Resolve {
                    path: doc.path.clone(),
                    source,
                })?;
            return Ok((doc, outcome));
        };

        let path = doc.path.clone();
        let chain = Arc::clone(&self.chain);
        let (tx, rx) = bounded(1);

        thread::Builder::new()
            .name(format!("resolve-{}", self.id))
            .spawn(move || {
                let mut doc = doc;
                let result = chain.resolve(&mut doc).map(|outcome| (doc, outcome));
                let _ = tx.send(result);
            })
            .map_err(|e| IndexError::Spawn(e.to_string()))?;

        match rx.recv_timeout(timeout) {
            Ok(Ok(resolved)) => Ok(resolved),
            Ok(Err(source)) => Err(IndexError::Resolve { path, source }),
            // The helper thread is left to finish on its own; its result is dropped.
            Err(RecvTimeoutError::Timeout) => Err(IndexError::ResolveTimeout { path, timeout }),
            Err(RecvTimeoutError::Disconnected) => Err(IndexError::ResolverDied {
                path,
                reason: "resolver panicked".to_string(),
            }),
        }
    }
}
