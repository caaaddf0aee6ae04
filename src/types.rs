//! Core data types shared by the indexing pipeline.

use chrono::{DateTime, Datelike, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CRC32 content fingerprint.
pub type Checksum = u32;

/// Ordered mapping of metadata field name to its values.
pub type Metadata = IndexMap<String, Vec<String>>;

/// A file found by the discovery walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub path: PathBuf,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

impl FileMeta {
    pub fn new(path: impl Into<PathBuf>, size: u64, last_modified: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            size,
            last_modified,
        }
    }

    /// Year of the last modification, used for freshness ordering.
    pub fn modified_year(&self) -> i32 {
        self.last_modified.year()
    }
}

/// Indexable unit keyed by file path.
///
/// A document is owned by the worker resolving it until it is committed to
/// the store. `has_data` is set by the resolver chain; a document without
/// data is never committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub path: PathBuf,
    pub checksum: Checksum,
    #[serde(default)]
    pub data: Vec<String>,
    #[serde(default)]
    pub has_data: bool,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    /// Create an unresolved document for a path and its current checksum.
    pub fn new(path: impl Into<PathBuf>, checksum: Checksum) -> Self {
        Self {
            path: path.into(),
            checksum,
            data: Vec::new(),
            has_data: false,
            metadata: Metadata::new(),
        }
    }

    /// Document used to ask resolvers whether a path is worth discovering.
    pub fn probe(path: &Path) -> Self {
        Self::new(path, 0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace resolved content and mark the document as committable.
    pub fn set_resolved(&mut self, data: Vec<String>, metadata: Metadata) {
        self.data = data;
        self.metadata = metadata;
        self.has_data = true;
    }

    /// Lowercased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

/// Result of comparing a file against the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Same (checksum, path) pair already indexed.
    Unchanged,
    /// Path indexed with a different checksum.
    Changed,
    /// Path not indexed.
    New,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_modified_year() {
        let meta = FileMeta::new(
            "a.txt",
            10,
            Utc.with_ymd_and_hms(2019, 6, 1, 12, 0, 0).unwrap(),
        );
        assert_eq!(meta.modified_year(), 2019);
    }

    #[test]
    fn test_resolved_document_has_data() {
        let mut doc = Document::new("notes/README.MD", 7);
        assert!(!doc.has_data);
        assert_eq!(doc.extension().as_deref(), Some("md"));

        let mut metadata = Metadata::new();
        metadata.insert("title".to_string(), vec!["Readme".to_string()]);
        doc.set_resolved(vec!["hello".to_string()], metadata);

        assert!(doc.has_data);
        assert_eq!(doc.data, vec!["hello"]);
        assert_eq!(doc.metadata["title"], vec!["Readme"]);
    }
}
