//! Indexing runs: change detection, work distribution, workers and the
//! coordinator that ties them together.

pub mod coordinator;
pub mod detector;
pub mod distributor;
pub mod error;
pub mod events;
pub mod worker;

pub use coordinator::{CoordinatorBuilder, CoordinatorStatus, RunCoordinator, RunPhase};
pub use detector::ChangeDetector;
pub use distributor::{Partition, WorkDistributor, WorkQueue};
pub use error::{IndexError, IndexResult};
pub use events::{FileOutcome, LogObserver, RunObserver, RunOutcome, RunStats, RunStatus};
pub use worker::{IndexWorker, WorkerConfig, WorkerEvent, WorkerReport};
