//! Status command.

use chrono::Local;
use serde_json::json;

use super::Workspace;
use super::update::format_bytes;
use crate::ledger::Ledger;
use crate::scheduler::Scheduler;

pub fn run(workspace: &Workspace, as_json: bool) -> anyhow::Result<()> {
    let settings = &workspace.settings;
    let state_path = settings.resolve_path(&settings.state_path);
    let scheduler = Scheduler::new(&settings.schedule, Local::now().naive_local())
        .with_state_file(&state_path)?;

    let documents = workspace.store.paths();
    // Sizes of the files as they are now, missing files count as zero.
    let source_bytes: u64 = documents
        .iter()
        .filter_map(|path| std::fs::metadata(path).ok())
        .map(|meta| meta.len())
        .sum();
    let in_flight = workspace.ledger.all();
    let last_update = scheduler.last_update().map(|t| t.format("%Y-%m-%d %H:%M").to_string());

    if as_json {
        let status = json!({
            "documents": documents.len(),
            "source_bytes": source_bytes,
            "in_flight": in_flight,
            "data_roots": settings.indexing.data_roots,
            "workers": settings.indexing.effective_workers(),
            "schedule": {
                "enabled": settings.schedule.enabled,
                "interval_minutes": settings.schedule.interval_minutes,
                "preferred_time": settings.schedule.preferred_time,
                "last_update": last_update,
            },
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!(
        "Documents:     {} ({} in source files now)",
        documents.len(),
        format_bytes(source_bytes)
    );
    println!("Workers:       {}", settings.indexing.effective_workers());
    println!("Data roots:");
    if settings.indexing.data_roots.is_empty() {
        println!("  (none configured)");
    }
    for root in &settings.indexing.data_roots {
        println!("  {}", settings.resolve_path(root).display());
    }

    if in_flight.is_empty() {
        println!("Interrupted:   none");
    } else {
        println!("Interrupted:   {} (run `docindex cleanup`)", in_flight.len());
        for path in &in_flight {
            println!("  {}", path.display());
        }
    }

    let schedule = &settings.schedule;
    if schedule.enabled {
        println!(
            "Schedule:      every {} min, preferred {}",
            schedule.interval_minutes, schedule.preferred_time
        );
    } else {
        println!("Schedule:      disabled");
    }
    println!(
        "Last update:   {}",
        last_update.as_deref().unwrap_or("never")
    );
    Ok(())
}
