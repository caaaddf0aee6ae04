//! Configuration module for the document indexer.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `DOCINDEX_` and use double
//! underscores to separate nested levels:
//! - `DOCINDEX_INDEXING__MAX_WORKERS=8` sets `indexing.max_workers`
//! - `DOCINDEX_SCHEDULE__INTERVAL_MINUTES=60` sets `schedule.interval_minutes`
//! - `DOCINDEX_INDEXING__MULTITHREADING=false` sets `indexing.multithreading`

use chrono::NaiveTime;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory holding the settings file and default state files.
pub const CONFIG_DIR: &str = ".docindex";
const SETTINGS_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "DOCINDEX_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Index snapshot file
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Crash-recovery ledger file
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    /// Scheduler state file (last update time)
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Workspace root directory (where .docindex is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub resolvers: ResolversConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// Directories crawled on every run
    #[serde(default)]
    pub data_roots: Vec<PathBuf>,

    /// Commit unmatched files with path and checksum only
    #[serde(default = "default_true")]
    pub use_default_fallback: bool,

    /// Split work across several workers
    #[serde(default = "default_true")]
    pub multithreading: bool,

    /// Upper bound for the worker count (capped by core count)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Explicit worker count, overrides `max_workers`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_count: Option<usize>,

    /// Consecutive commit failures after which a worker gives up its queue
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,

    /// Per-file resolve timeout in seconds, 0 disables it
    #[serde(default = "default_resolve_timeout_secs")]
    pub resolve_timeout_secs: u64,

    /// Glob patterns excluded from discovery
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScheduleConfig {
    /// Run automatic updates
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between automatic updates
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    /// Preferred time of day ("HH:MM") when the interval is whole days
    #[serde(default = "default_preferred_time")]
    pub preferred_time: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ResolversConfig {
    #[serde(default)]
    pub text: TextResolverConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TextResolverConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_text_extensions")]
    pub extensions: Vec<String>,

    /// Larger files are not resolved as text
    #[serde(default = "default_text_max_bytes")]
    pub max_bytes: u64,

    #[serde(default = "default_text_priority")]
    pub priority: f64,
}

/// Logging configuration.
///
/// `RUST_LOG` takes precedence over these values.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for all targets
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `worker = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("index.json")
}
fn default_ledger_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("inflight.json")
}
fn default_state_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("schedule.json")
}
fn default_true() -> bool {
    true
}
fn default_max_workers() -> usize {
    num_cpus::get()
}
fn default_failure_threshold() -> usize {
    5
}
fn default_resolve_timeout_secs() -> u64 {
    300
}
fn default_interval_minutes() -> u64 {
    24 * 60
}
fn default_preferred_time() -> String {
    "03:00".to_string()
}
fn default_text_extensions() -> Vec<String> {
    ["txt", "md", "log", "csv", "json", "toml", "xml", "html", "ini"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_text_max_bytes() -> u64 {
    16 * 1024 * 1024
}
fn default_text_priority() -> f64 {
    1.0
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            ledger_path: default_ledger_path(),
            state_path: default_state_path(),
            workspace_root: None,
            indexing: IndexingConfig::default(),
            schedule: ScheduleConfig::default(),
            resolvers: ResolversConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            data_roots: Vec::new(),
            use_default_fallback: true,
            multithreading: true,
            max_workers: default_max_workers(),
            worker_count: None,
            failure_threshold: default_failure_threshold(),
            resolve_timeout_secs: default_resolve_timeout_secs(),
            ignore_patterns: vec![
                ".git/**".to_string(),
                "node_modules/**".to_string(),
                "*.tmp".to_string(),
            ],
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: default_interval_minutes(),
            preferred_time: default_preferred_time(),
        }
    }
}

impl Default for TextResolverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            extensions: default_text_extensions(),
            max_bytes: default_text_max_bytes(),
            priority: default_text_priority(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl IndexingConfig {
    /// Number of workers a run uses.
    ///
    /// An explicit `worker_count` wins, otherwise `max_workers` capped by the
    /// core count. Always 1 when multithreading is disabled.
    pub fn effective_workers(&self) -> usize {
        if !self.multithreading {
            return 1;
        }
        match self.worker_count {
            Some(count) => count.max(1),
            None => self.max_workers.min(num_cpus::get()).max(1),
        }
    }

    pub fn resolve_timeout(&self) -> Option<Duration> {
        (self.resolve_timeout_secs > 0).then(|| Duration::from_secs(self.resolve_timeout_secs))
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.max(1) * 60)
    }

    /// Parsed preferred time of day, `None` if it is not valid `HH:MM`.
    pub fn preferred_time_of_day(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(self.preferred_time.trim(), "%H:%M").ok()
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(SETTINGS_FILE));

        Self::figment(config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref().to_path_buf())
            .extract()
            .map_err(Box::new)
    }

    fn figment(config_path: PathBuf) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels, single underscores stay
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the settings file by looking for .docindex upwards from the current directory
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(SETTINGS_FILE))
    }

    /// Get the workspace root directory (where .docindex is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Resolve a configured path against the workspace root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.workspace_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file in the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join(SETTINGS_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let mut settings = Settings::default();
        if let Ok(current_dir) = std::env::current_dir() {
            settings.workspace_root = Some(current_dir);
        }

        settings.save(&config_path)?;
        Ok(config_path)
    }
}
