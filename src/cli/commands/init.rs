//! Init and Config commands.

use anyhow::anyhow;

use crate::config::Settings;

/// Create `.docindex/settings.toml` in the current directory.
pub fn run_init(force: bool) -> anyhow::Result<()> {
    let path = Settings::init_config_file(force).map_err(|e| anyhow!("{e}"))?;
    println!("Created configuration file at: {}", path.display());
    println!("Add your document directories to indexing.data_roots.");
    Ok(())
}

/// Display the active configuration.
pub fn run_config(settings: &Settings) -> anyhow::Result<()> {
    println!("Current Configuration:");
    println!("{}", "=".repeat(50));
    println!("{}", toml::to_string_pretty(settings)?);
    Ok(())
}
