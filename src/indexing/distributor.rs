//! Work distribution across workers.
//!
//! Single worker: the whole set, newest modification years first.
//!
//! Several workers: files get a random bucket in `0..10`, are stable-sorted
//! by (bucket ascending, year descending), and are then handed out one at a
//! time to whichever worker holds the fewest bytes so far. The greedy
//! assignment keeps every worker's load within one file of the average.

use rand::Rng;
use std::cmp::Reverse;
use std::collections::VecDeque;

use crate::types::FileMeta;

/// A worker's private FIFO of files.
pub type WorkQueue = VecDeque<FileMeta>;

/// Number of random buckets used to shuffle multi-worker input.
pub const BUCKETS: u8 = 10;

/// Files assigned to one worker plus their total size.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub queue: WorkQueue,
    pub bytes: u64,
}

pub struct WorkDistributor;

impl WorkDistributor {
    /// Split `files` into `worker_count` queues.
    pub fn partition<R: Rng>(
        files: Vec<FileMeta>,
        worker_count: usize,
        rng: &mut R,
    ) -> Vec<Partition> {
        let worker_count = worker_count.max(1);
        if worker_count == 1 {
            return vec![Self::single(files)];
        }

        let ordered = Self::bucketed(files, rng);
        let partitions = Self::min_load(ordered.into_iter().map(|(_, file)| file), worker_count);
        tracing::debug!(
            target: "distributor",
            "partitioned into {} queues, loads: {:?}",
            partitions.len(),
            partitions.iter().map(|p| p.bytes).collect::<Vec<_>>()
        );
        partitions
    }

    /// One queue, newest years first, original order within a year.
    pub fn single(mut files: Vec<FileMeta>) -> Partition {
        files.sort_by_key(|file| Reverse(file.modified_year()));
        let bytes = files.iter().map(|f| f.size).sum();
        Partition {
            queue: files.into(),
            bytes,
        }
    }

    /// Random bucket per file, stable-sorted by bucket then year descending.
    pub fn bucketed<R: Rng>(files: Vec<FileMeta>, rng: &mut R) -> Vec<(u8, FileMeta)> {
        let mut ordered: Vec<(u8, FileMeta)> = files
            .into_iter()
            .map(|file| (rng.random_range(0..BUCKETS), file))
            .collect();
        ordered.sort_by_key(|(bucket, file)| (*bucket, Reverse(file.modified_year())));
        ordered
    }

    /// Greedy min-load assignment in the given order.
    ///
    /// Ties go to the lowest worker index.
    pub fn min_load(files: impl IntoIterator<Item = FileMeta>, worker_count: usize) -> Vec<Partition> {
        let mut partitions = vec![Partition::default(); worker_count.max(1)];

        for file in files {
            let target = partitions
                .iter()
                .enumerate()
                .min_by_key(|(index, p)| (p.bytes, *index))
                .map(|(index, _)| index)
                .unwrap_or(0);
            let partition = &mut partitions[target];
            partition.bytes += file.size;
            partition.queue.push_back(file);
        }

        partitions
    }
}
