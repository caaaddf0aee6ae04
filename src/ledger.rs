//! Crash-recovery ledger of in-flight paths.
//!
//! A path is added right before its index mutation starts and removed right
//! after it ends. Anything still listed when the process starts again was
//! interrupted mid-write and must be purged from the index.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to read ledger {}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write ledger {}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Ledger {} is corrupted", .path.display())]
    Corrupted {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Persisted set of paths whose index mutation is in progress.
pub trait Ledger: Send + Sync {
    fn add(&self, path: &Path) -> LedgerResult<()>;
    fn remove(&self, path: &Path) -> LedgerResult<()>;
    /// Snapshot of all entries, sorted.
    fn all(&self) -> Vec<PathBuf>;

    fn is_empty(&self) -> bool {
        self.all().is_empty()
    }
}

/// Volatile ledger, useful when no crash recovery is wanted.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: Mutex<BTreeSet<PathBuf>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            entries: Mutex::new(entries.into_iter().map(Into::into).collect()),
        }
    }
}

impl Ledger for MemoryLedger {
    fn add(&self, path: &Path) -> LedgerResult<()> {
        self.entries.lock().insert(path.to_path_buf());
        Ok(())
    }

    fn remove(&self, path: &Path) -> LedgerResult<()> {
        self.entries.lock().remove(path);
        Ok(())
    }

    fn all(&self) -> Vec<PathBuf> {
        self.entries.lock().iter().cloned().collect()
    }
}

#[derive(Serialize, Deserialize, Default)]
struct LedgerFile {
    in_flight: BTreeSet<PathBuf>,
}

/// Ledger flushed to a JSON file on every change.
///
/// Writes go to a temp file in the same directory which is then renamed over
/// the ledger, so a crash leaves either the old or the new set.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    entries: Mutex<BTreeSet<PathBuf>>,
}

impl FileLedger {
    /// Open the ledger at `path`, loading existing entries.
    pub fn open(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let json = fs::read_to_string(&path).map_err(|source| LedgerError::Read {
                path: path.clone(),
                source,
            })?;
            if json.trim().is_empty() {
                BTreeSet::new()
            } else {
                let file: LedgerFile =
                    serde_json::from_str(&json).map_err(|source| LedgerError::Corrupted {
                        path: path.clone(),
                        source,
                    })?;
                file.in_flight
            }
        } else {
            BTreeSet::new()
        };

        if !entries.is_empty() {
            tracing::warn!(
                target: "ledger",
                "{} interrupted file(s) found in {}",
                entries.len(),
                path.display()
            );
        }

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeSet<PathBuf>) -> LedgerResult<()> {
        let write_err = |source| LedgerError::Write {
            path: self.path.clone(),
            source,
        };

        let json = serde_json::to_vec_pretty(&LedgerFile {
            in_flight: entries.clone(),
        })
        .map_err(|e| write_err(std::io::Error::other(e)))?;

        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(write_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(write_err)?;
        tmp.write_all(&json).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

impl Ledger for FileLedger {
    fn add(&self, path: &Path) -> LedgerResult<()> {
        let mut entries = self.entries.lock();
        if entries.insert(path.to_path_buf()) {
            if let Err(e) = self.persist(&entries) {
                entries.remove(path);
                return Err(e);
            }
        }
        Ok(())
    }

    fn remove(&self, path: &Path) -> LedgerResult<()> {
        let mut entries = self.entries.lock();
        if entries.remove(path) {
            self.persist(&entries)?;
        }
        Ok(())
    }

    fn all(&self) -> Vec<PathBuf> {
        self.entries.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_ledger() {
        let ledger = MemoryLedger::new();
        ledger.add(Path::new("b.txt")).unwrap();
        ledger.add(Path::new("a.txt")).unwrap();
        assert_eq!(
            ledger.all(),
            vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]
        );

        ledger.remove(Path::new("a.txt")).unwrap();
        ledger.remove(Path::new("b.txt")).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_file_ledger_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state").join("inflight.json");

        {
            let ledger = FileLedger::open(&path).unwrap();
            ledger.add(Path::new("/data/a.txt")).unwrap();
            ledger.add(Path::new("/data/b.txt")).unwrap();
            ledger.remove(Path::new("/data/a.txt")).unwrap();
            // Dropped without cleanup, as if the process died mid-file.
        }

        let reopened = FileLedger::open(&path).unwrap();
        assert_eq!(reopened.all(), vec![PathBuf::from("/data/b.txt")]);
    }

    #[test]
    fn test_file_ledger_rejects_garbage() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("inflight.json");
        fs::write(&path, "{not json").unwrap();

        let err = FileLedger::open(&path).unwrap_err();
        let LedgerError::Corrupted { source, .. } = &err else {
            panic!("unexpected error {err:?}");
        };

        // The parse error is reported once, as the cause.
        let rendered = crate::logging::error_chain(&err);
        assert_eq!(rendered.matches(&source.to_string()).count(), 1, "{rendered}");
        assert!(rendered.starts_with(&format!("Ledger {} is corrupted: caused by:", path.display())));
    }

    #[test]
    fn test_empty_file_is_empty_ledger() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("inflight.json");
        fs::write(&path, "").unwrap();

        let ledger = FileLedger::open(&path).unwrap();
        assert!(ledger.is_empty());
    }
}
