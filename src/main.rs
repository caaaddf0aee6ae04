use anyhow::anyhow;
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;

use docindex::Settings;
use docindex::cli::commands::{self, Workspace, update::UpdateArgs};
use docindex::cli::{Cli, Commands};

fn load_settings(config: Option<&Path>) -> anyhow::Result<Settings> {
    let Some(path) = config else {
        return Settings::load().map_err(|e| anyhow!("{e}"));
    };

    let mut settings = Settings::load_from(path).map_err(|e| anyhow!("{e}"))?;
    if settings.workspace_root.is_none() {
        // .docindex/settings.toml -> workspace root two levels up
        settings.workspace_root = path
            .parent()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .filter(|root| !root.as_os_str().is_empty());
    }
    Ok(settings)
}

fn run(cli: Cli, settings: Settings) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init { force } => commands::init::run_init(force),
        Commands::Config => commands::init::run_config(&settings),
        Commands::Update {
            paths,
            workers,
            no_fallback,
            no_progress,
        } => {
            let mut workspace = Workspace::open(settings)?;
            let args = UpdateArgs {
                paths,
                workers,
                no_fallback,
                progress: !no_progress,
            };
            commands::update::run(args, &mut workspace).map(|_| ())
        }
        Commands::Cleanup => {
            let workspace = Workspace::open(settings)?;
            commands::update::run_cleanup(&workspace).map(|_| ())
        }
        Commands::Status { json } => {
            let workspace = Workspace::open(settings)?;
            commands::status::run(&workspace, json)
        }
        Commands::Daemon { no_schedule } => {
            let workspace = Workspace::open(settings)?;
            commands::daemon::run(&workspace, !no_schedule)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    docindex::logging::init_with_config(&settings.logging);
    tracing::debug!(target: "cli", "command: {:?}", cli.command);

    match run(cli, settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
