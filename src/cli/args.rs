//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

#[derive(Parser, Debug)]
#[command(
    name = "docindex",
    version,
    about = "Scheduled, crash-safe document indexing",
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Settings file (default: .docindex/settings.toml, searched upwards)
    #[arg(short, long, global = true, env = "DOCINDEX_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Set up .docindex in the current directory
    Init {
        /// Overwrite an existing settings file
        #[arg(short, long)]
        force: bool,
    },

    /// Display active settings
    Config,

    /// Run one indexing pass and wait for it
    Update {
        /// Data roots to crawl (default: indexing.data_roots)
        paths: Vec<PathBuf>,

        /// Worker count (overrides config)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Skip files no resolver accepts instead of indexing path and checksum
        #[arg(long)]
        no_fallback: bool,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Purge documents left behind by interrupted runs
    Cleanup,

    /// Show index, ledger and schedule state
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the scheduler and read service commands from stdin
    ///
    /// Commands: test, update, cleanup, shutdown, cancel (or codes 128-132).
    /// End of input shuts the daemon down.
    Daemon {
        /// Do not start automatic updates
        #[arg(long)]
        no_schedule: bool,
    },
}
