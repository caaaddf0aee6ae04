//! Update and Cleanup commands.

use anyhow::bail;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::Workspace;
use crate::indexing::{RunObserver, RunOutcome, RunStatus};

/// Arguments for the update command.
pub struct UpdateArgs {
    pub paths: Vec<PathBuf>,
    pub workers: Option<usize>,
    pub no_fallback: bool,
    pub progress: bool,
}

/// Drives a terminal progress bar from run notifications.
struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    fn new() -> Self {
        let bar = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.cyan} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}",
        ) {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }
}

impl RunObserver for ProgressObserver {
    fn notify_start(&self, total_files: u64, total_bytes: u64) {
        self.bar
            .set_message(format!("{total_files} files, {}", format_bytes(total_bytes)));
    }

    fn report_progress(&self, percent: u8, _current_item_bytes: u64) {
        self.bar.set_position(u64::from(percent));
    }

    fn notify_finish(&self, _outcome: &RunOutcome) {
        self.bar.finish_and_clear();
    }
}

/// Run one indexing pass in the foreground.
pub fn run(args: UpdateArgs, workspace: &mut Workspace) -> anyhow::Result<RunOutcome> {
    let indexing = &mut workspace.settings.indexing;
    if !args.paths.is_empty() {
        indexing.data_roots = args
            .paths
            .into_iter()
            .map(|path| std::path::absolute(&path).unwrap_or(path))
            .collect();
    }
    if let Some(workers) = args.workers {
        indexing.worker_count = Some(workers);
    }
    if args.no_fallback {
        indexing.use_default_fallback = false;
    }

    let coordinator = workspace.coordinator();
    if args.progress {
        coordinator.add_observer(Arc::new(ProgressObserver::new()));
    }

    if !coordinator.start_update() {
        bail!("An update is already in progress");
    }
    coordinator.wait();

    let Some(outcome) = coordinator.last_outcome() else {
        bail!("Update finished without an outcome");
    };

    let stats = &outcome.stats;
    match &outcome.status {
        RunStatus::Failed(reason) => bail!("Update failed: {reason}"),
        RunStatus::Cancelled => println!("Update cancelled after {:?}", outcome.elapsed),
        RunStatus::Completed => println!(
            "Indexed {} files ({}) in {:.2}s",
            outcome.total_files,
            format_bytes(outcome.total_bytes),
            outcome.elapsed.as_secs_f64()
        ),
    }
    println!(
        "  added: {}  updated: {}  unchanged: {}  skipped: {}  failed: {}",
        stats.added, stats.updated, stats.unchanged, stats.skipped, stats.failed
    );
    if stats.aborted_workers > 0 {
        println!(
            "  {} worker(s) stopped early after repeated commit failures",
            stats.aborted_workers
        );
    }
    println!("  documents in index: {}", workspace.store.document_count());

    Ok(outcome)
}

/// Purge documents of interrupted files from the index.
pub fn run_cleanup(workspace: &Workspace) -> anyhow::Result<usize> {
    let cleared = workspace.coordinator().cleanup()?;
    if cleared == 0 {
        println!("Nothing to clean up");
    } else {
        println!("Removed {cleared} interrupted document(s) from the index");
    }
    Ok(cleared)
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
