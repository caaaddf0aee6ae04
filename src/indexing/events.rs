//! Run notifications and statistics.
//!
//! Workers report over a channel to the coordinator's aggregator loop, which
//! is the only place observers are called from. Observers therefore never
//! see concurrent or re-entrant calls for the same run.

use std::time::Duration;

/// What happened to a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Unchanged,
    Added,
    Updated,
    /// No resolver matched and the fallback is disabled.
    Skipped,
}

/// Counters for one worker or a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub unchanged: u64,
    pub added: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Workers that gave up their queue after repeated commit failures.
    pub aborted_workers: u64,
}

impl RunStats {
    pub fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Unchanged => self.unchanged += 1,
            FileOutcome::Added => self.added += 1,
            FileOutcome::Updated => self.updated += 1,
            FileOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn merge(&mut self, other: &RunStats) {
        self.unchanged += other.unchanged;
        self.added += other.added;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.aborted_workers += other.aborted_workers;
    }

    /// Files that reached a terminal state, failed ones included.
    pub fn processed(&self) -> u64 {
        self.unchanged + self.added + self.updated + self.skipped + self.failed
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Cancelled,
    Failed(String),
}

/// Summary passed to [`RunObserver::notify_finish`].
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub total_files: u64,
    pub total_bytes: u64,
    pub stats: RunStats,
    pub elapsed: Duration,
}

impl RunOutcome {
    pub fn was_cancelled(&self) -> bool {
        matches!(self.status, RunStatus::Cancelled)
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            RunStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Receives progress for indexing runs.
pub trait RunObserver: Send + Sync {
    fn notify_start(&self, _total_files: u64, _total_bytes: u64) {}

    /// `percent` is `finished_files * 100 / total_files`.
    fn report_progress(&self, _percent: u8, _current_item_bytes: u64) {}

    /// Called exactly once per run.
    fn notify_finish(&self, outcome: &RunOutcome);
}

/// Observer that writes run lifecycle to the log.
#[derive(Debug, Default)]
pub struct LogObserver;

impl RunObserver for LogObserver {
    fn notify_start(&self, total_files: u64, total_bytes: u64) {
        crate::log_event!(
            "coordinator",
            "run started",
            "{total_files} files, {total_bytes} bytes"
        );
    }

    fn report_progress(&self, percent: u8, current_item_bytes: u64) {
        crate::debug_event!(
            "coordinator",
            "progress",
            "{percent}% (last item {current_item_bytes} bytes)"
        );
    }

    fn notify_finish(&self, outcome: &RunOutcome) {
        let stats = &outcome.stats;
        match &outcome.status {
            RunStatus::Failed(reason) => {
                tracing::error!(target: "coordinator", "[coordinator] run failed: {reason}");
            }
            status => crate::log_event!(
                "coordinator",
                "run finished",
                "{status:?} in {:?}: added={}, updated={}, unchanged={}, skipped={}, failed={}",
                outcome.elapsed,
                stats.added,
                stats.updated,
                stats.unchanged,
                stats.skipped,
                stats.failed
            ),
        }
    }
}

/// Integer percentage, 100 for an empty run.
pub fn percent_complete(finished: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (finished.min(total) * 100 / total) as u8
}
