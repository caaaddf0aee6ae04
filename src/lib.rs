//! Scheduled, crash-safe document indexing.
//!
//! A [`RunCoordinator`] crawls the configured data roots, classifies every
//! file against the index by (checksum, path), resolves new and changed
//! files through a priority-ordered [`ResolverChain`] and commits them with
//! one store connection per worker. A persisted [`Ledger`] brackets every
//! index mutation so interrupted work is purged before the next run.

pub mod checksum;
pub mod cli;
pub mod config;
pub mod control;
pub mod indexing;
pub mod ledger;
pub mod logging;
pub mod resolver;
pub mod scheduler;
pub mod store;
pub mod types;
pub mod walker;

pub use checksum::{ChecksumProvider, Crc32Checksum};
pub use config::Settings;
pub use control::{CommandReply, ControlSurface, ServiceCommand};
pub use indexing::{
    CoordinatorStatus, IndexError, IndexResult, LogObserver, RunCoordinator, RunObserver,
    RunOutcome, RunPhase, RunStats, RunStatus,
};
pub use ledger::{FileLedger, Ledger, MemoryLedger};
pub use resolver::{Resolution, ResolveError, Resolver, ResolverChain, TextResolver};
pub use scheduler::Scheduler;
pub use store::{IndexStore, MemoryStore, StoreConnection, StoreError};
pub use types::{Checksum, Classification, Document, FileMeta, Metadata};
pub use walker::{FileLister, FsWalker};
