//! Daemon command: scheduler plus a line-based command channel on stdin.

use chrono::Local;
use crossbeam_channel::bounded;
use std::io::{self, BufRead};

use super::Workspace;
use crate::control::{CommandReply, ControlSurface, ServiceCommand};
use crate::logging::error_chain;
use crate::scheduler::Scheduler;

pub fn run(workspace: &Workspace, schedule: bool) -> anyhow::Result<()> {
    let settings = &workspace.settings;
    let coordinator = workspace.coordinator();
    let (shutdown_tx, shutdown_rx) = bounded(1);

    let scheduler = if schedule && settings.schedule.enabled {
        let state_path = settings.resolve_path(&settings.state_path);
        let scheduler = Scheduler::new(&settings.schedule, Local::now().naive_local())
            .with_state_file(state_path)?;
        Some(scheduler.spawn(coordinator.clone(), shutdown_rx)?)
    } else {
        None
    };

    let control = ControlSurface::new(coordinator).with_shutdown(shutdown_tx);
    crate::log_event!("cli", "daemon ready", "scheduler: {}", scheduler.is_some());

    let mut shut_down = false;
    for line in io::stdin().lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command = match line.parse::<ServiceCommand>() {
            Ok(command) => command,
            Err(e) => {
                println!("error: {e}");
                continue;
            }
        };

        match control.execute(command) {
            Ok(reply) => {
                println!("{reply}");
                if reply == CommandReply::ShuttingDown {
                    shut_down = true;
                    break;
                }
            }
            Err(e) => println!("error: {}", error_chain(&e)),
        }
    }

    if !shut_down {
        println!("{}", control.execute(ServiceCommand::Shutdown)?);
    }

    if let Some(handle) = scheduler {
        if handle.join().is_err() {
            tracing::error!(target: "cli", "scheduler thread panicked");
        }
    }
    Ok(())
}
