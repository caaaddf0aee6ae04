//! In-memory index store with an optional JSON snapshot on disk.
//!
//! All connections share one document map behind a `RwLock`. The snapshot
//! is written atomically (temp file + rename) on [`IndexStore::flush`], so a
//! crash never leaves a half-written snapshot behind.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::{IndexStore, StoreConnection, StoreError, StoreResult};
use crate::types::{Checksum, Document};

const SNAPSHOT_VERSION: u32 = 1;

/// Counts of write operations applied to the store.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreMutations {
    pub adds: u64,
    pub updates: u64,
    pub deletes: u64,
    pub metadata_writes: u64,
}

impl StoreMutations {
    pub fn total(&self) -> u64 {
        self.adds + self.updates + self.deletes + self.metadata_writes
    }
}

#[derive(Default)]
struct Counters {
    adds: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    metadata_writes: AtomicU64,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    documents: Vec<Document>,
}

struct Shared {
    documents: RwLock<HashMap<PathBuf, Document>>,
    snapshot_path: Option<PathBuf>,
    dirty: AtomicBool,
    counters: Counters,
}

/// Shared in-memory document index.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Volatile store, nothing is written to disk.
    pub fn new() -> Self {
        Self::with_documents(None, HashMap::new())
    }

    /// Open a store backed by a snapshot file, loading it if present.
    pub fn open(snapshot_path: impl Into<PathBuf>) -> StoreResult<Self> {
        let snapshot_path = snapshot_path.into();
        let mut documents = HashMap::new();

        if snapshot_path.exists() {
            let json = fs::read_to_string(&snapshot_path)?;
            let snapshot: Snapshot = serde_json::from_str(&json)?;
            if snapshot.version != SNAPSHOT_VERSION {
                return Err(StoreError::Unavailable(format!(
                    "unsupported snapshot version {} in {}",
                    snapshot.version,
                    snapshot_path.display()
                )));
            }
            for doc in snapshot.documents {
                documents.insert(doc.path.clone(), doc);
            }
            tracing::debug!(
                target: "store",
                "loaded {} documents from {}",
                documents.len(),
                snapshot_path.display()
            );
        }

        Ok(Self::with_documents(Some(snapshot_path), documents))
    }

    fn with_documents(
        snapshot_path: Option<PathBuf>,
        documents: HashMap<PathBuf, Document>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                documents: RwLock::new(documents),
                snapshot_path,
                dirty: AtomicBool::new(false),
                counters: Counters::default(),
            }),
        }
    }

    /// Insert a document directly, bypassing mutation counters.
    pub fn seed(&self, doc: Document) {
        self.shared.documents.write().insert(doc.path.clone(), doc);
    }

    pub fn document_count(&self) -> usize {
        self.shared.documents.read().len()
    }

    /// Copy of the stored document at `path`.
    pub fn get(&self, path: &Path) -> Option<Document> {
        self.shared.documents.read().get(path).cloned()
    }

    /// All indexed paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.shared.documents.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn mutations(&self) -> StoreMutations {
        let c = &self.shared.counters;
        StoreMutations {
            adds: c.adds.load(Ordering::Relaxed),
            updates: c.updates.load(Ordering::Relaxed),
            deletes: c.deletes.load(Ordering::Relaxed),
            metadata_writes: c.metadata_writes.load(Ordering::Relaxed),
        }
    }

    fn write_snapshot(&self, path: &Path) -> StoreResult<()> {
        let mut documents: Vec<Document> =
            self.shared.documents.read().values().cloned().collect();
        documents.sort_by(|a, b| a.path.cmp(&b.path));
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            documents,
        };
        let json = serde_json::to_vec_pretty(&snapshot)?;

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| StoreError::Persist {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexStore for MemoryStore {
    fn connect(&self) -> StoreResult<Box<dyn StoreConnection>> {
        Ok(Box::new(MemoryConnection {
            shared: Arc::clone(&self.shared),
            pending: Vec::new(),
        }))
    }

    fn flush(&self) -> StoreResult<()> {
        let Some(path) = &self.shared.snapshot_path else {
            return Ok(());
        };
        if !self.shared.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        if let Err(e) = self.write_snapshot(path) {
            self.shared.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        tracing::debug!(target: "store", "snapshot written to {}", path.display());
        Ok(())
    }
}

struct PendingMetadata {
    path: PathBuf,
    field: String,
    values: Vec<String>,
}

struct MemoryConnection {
    shared: Arc<Shared>,
    pending: Vec<PendingMetadata>,
}

impl MemoryConnection {
    fn mark_dirty(&self) {
        self.shared.dirty.store(true, Ordering::Release);
    }
}

impl StoreConnection for MemoryConnection {
    fn document_exists(&self, path: &Path) -> StoreResult<bool> {
        Ok(self.shared.documents.read().contains_key(path))
    }

    fn document_exists_with_checksum(&self, checksum: Checksum, path: &Path) -> StoreResult<bool> {
        Ok(self
            .shared
            .documents
            .read()
            .get(path)
            .is_some_and(|doc| doc.checksum == checksum))
    }

    fn get_document(&self, path: &Path) -> StoreResult<Option<Document>> {
        Ok(self.shared.documents.read().get(path).cloned())
    }

    fn add_document(&mut self, doc: &Document) -> StoreResult<()> {
        if !doc.has_data {
            return Err(StoreError::Unresolved(doc.path.clone()));
        }
        {
            let mut documents = self.shared.documents.write();
            if documents.contains_key(&doc.path) {
                return Err(StoreError::DocumentExists(doc.path.clone()));
            }
            let mut stored = doc.clone();
            stored.metadata.clear();
            documents.insert(doc.path.clone(), stored);
        }
        self.shared.counters.adds.fetch_add(1, Ordering::Relaxed);
        self.mark_dirty();
        Ok(())
    }

    fn update_document(&mut self, doc: &Document) -> StoreResult<()> {
        if !doc.has_data {
            return Err(StoreError::Unresolved(doc.path.clone()));
        }
        {
            let mut documents = self.shared.documents.write();
            let stored = documents
                .get_mut(&doc.path)
                .ok_or_else(|| StoreError::DocumentNotFound(doc.path.clone()))?;
            stored.checksum = doc.checksum;
            stored.data = doc.data.clone();
            stored.has_data = true;
            stored.metadata.clear();
        }
        self.shared.counters.updates.fetch_add(1, Ordering::Relaxed);
        self.mark_dirty();
        Ok(())
    }

    fn delete(&mut self, path: &Path) -> StoreResult<bool> {
        self.pending.retain(|p| p.path != path);
        let existed = self.shared.documents.write().remove(path).is_some();
        if existed {
            self.shared.counters.deletes.fetch_add(1, Ordering::Relaxed);
            self.mark_dirty();
        }
        Ok(existed)
    }

    fn add_metadata(&mut self, path: &Path, field: &str, values: &[String]) -> StoreResult<()> {
        self.pending.push(PendingMetadata {
            path: path.to_path_buf(),
            field: field.to_string(),
            values: values.to_vec(),
        });
        Ok(())
    }

    fn submit_changes(&mut self) -> StoreResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending);
        let mut documents = self.shared.documents.write();

        // Validate the whole batch before applying any of it.
        if let Some(missing) = pending.iter().find(|p| !documents.contains_key(&p.path)) {
            return Err(StoreError::DocumentNotFound(missing.path.clone()));
        }

        let count = pending.len() as u64;
        for entry in pending {
            if let Some(doc) = documents.get_mut(&entry.path) {
                doc.metadata.insert(entry.field, entry.values);
            }
        }
        drop(documents);

        self.shared
            .counters
            .metadata_writes
            .fetch_add(count, Ordering::Relaxed);
        self.mark_dirty();
        Ok(())
    }
}
