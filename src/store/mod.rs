//! Index store contract consumed by the indexing workers.
//!
//! The storage engine itself is pluggable. Workers never share a
//! connection: each opens its own [`StoreConnection`] through
//! [`IndexStore::connect`], and all connections address the same backing
//! store.

mod error;
mod memory;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryStore, StoreMutations};

use crate::types::{Checksum, Document};
use std::path::Path;

/// Backing store that hands out per-worker connections.
pub trait IndexStore: Send + Sync {
    /// Open a new connection. Must succeed when called concurrently.
    fn connect(&self) -> StoreResult<Box<dyn StoreConnection>>;

    /// Make committed changes durable. Called after cleanup and after each run.
    fn flush(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// A single worker's handle on the index.
pub trait StoreConnection: Send {
    fn document_exists(&self, path: &Path) -> StoreResult<bool>;

    fn document_exists_with_checksum(&self, checksum: Checksum, path: &Path) -> StoreResult<bool>;

    fn get_document(&self, path: &Path) -> StoreResult<Option<Document>>;

    /// Insert a new document. Fails if the path is already indexed.
    fn add_document(&mut self, doc: &Document) -> StoreResult<()>;

    /// Replace checksum and content of an existing document.
    fn update_document(&mut self, doc: &Document) -> StoreResult<()>;

    /// Remove the document at `path`. Returns whether one existed.
    fn delete(&mut self, path: &Path) -> StoreResult<bool>;

    /// Queue a metadata field for the committed document at `path`.
    fn add_metadata(&mut self, path: &Path, field: &str, values: &[String]) -> StoreResult<()>;

    /// Flush queued metadata writes.
    fn submit_changes(&mut self) -> StoreResult<()>;
}
