use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::resolver::ResolveError;
use crate::store::StoreError;
use crate::walker::WalkError;

/// Errors from indexing runs and single-file processing.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to checksum {}", .path.display())]
    Checksum {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to look up {} in the index", .path.display())]
    Lookup {
        path: PathBuf,
        #[source]
        source: StoreError,
    },

    #[error("Failed to resolve {}", .path.display())]
    Resolve {
        path: PathBuf,
        #[source]
        source: ResolveError,
    },

    #[error("Resolving {} exceeded {timeout:?}", .path.display())]
    ResolveTimeout { path: PathBuf, timeout: Duration },

    #[error("Resolver thread for {} died: {reason}", .path.display())]
    ResolverDied { path: PathBuf, reason: String },

    #[error("Failed to commit {}", .path.display())]
    Commit {
        path: PathBuf,
        #[source]
        source: StoreError,
    },

    #[error("Failed to submit metadata for {}", .path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: StoreError,
    },

    #[error("Crash-recovery ledger error")]
    Ledger(#[from] LedgerError),

    #[error("Failed to open index connection")]
    Connect(#[source] StoreError),

    #[error("Failed to flush index")]
    Flush(#[source] StoreError),

    #[error("No data roots configured")]
    NoDataRoots,

    #[error("Failed to discover files")]
    Discovery(#[from] WalkError),

    #[error("Failed to start worker: {0}")]
    Spawn(String),

    #[error("An update is already in progress")]
    RunInProgress,
}

impl IndexError {
    /// Commit and metadata failures count towards a worker's
    /// consecutive-failure threshold.
    pub fn is_commit_failure(&self) -> bool {
        matches!(self, Self::Commit { .. } | Self::Metadata { .. })
    }

    /// Path of the file this error belongs to, for per-file failures.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Checksum { path, .. }
            | Self::Lookup { path, .. }
            | Self::Resolve { path, .. }
            | Self::ResolveTimeout { path, .. }
            | Self::ResolverDied { path, .. }
            | Self::Commit { path, .. }
            | Self::Metadata { path, .. } => Some(path),
            _ => None,
        }
    }
}

pub type IndexResult<T> = Result<T, IndexError>;
