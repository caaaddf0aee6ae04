//! Logging setup for the indexer and the daemon.
//!
//! Compact timestamped output with per-target levels taken from the
//! `[logging]` section of the settings. `RUST_LOG` overrides the config:
//!
//! ```bash
//! RUST_LOG=debug docindex update
//! RUST_LOG=coordinator=debug,worker=trace docindex daemon
//! ```
//!
//! Targets used by the crate: `coordinator`, `worker`, `walker`, `distributor`,
//! `scheduler`, `ledger`, `store`, `resolver`, `control`, `cli`.

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Build the filter directive string from config, e.g. `warn,worker=debug`.
pub fn filter_directives(config: &LoggingConfig) -> String {
    let mut modules: Vec<_> = config.modules.iter().collect();
    modules.sort();

    let mut directives = config.default.clone();
    for (target, level) in modules {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

/// Initialize logging. Only the first call takes effect.
///
/// Output goes to stderr so command output on stdout stays clean.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

/// Initialize logging with `LoggingConfig::default()` (warn and above).
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Log a lifecycle event for a component.
///
/// ```ignore
/// log_event!("coordinator", "run started", "{} files", total);
/// log_event!("scheduler", "tick");
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!(target: $component, "[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!(target: $component, "[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-level variant of [`log_event!`].
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!(target: $component, "[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!(target: $component, "[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Render an error with its source chain: `outer: caused by: inner`.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(&format!(": caused by: {cause}"));
        source = cause.source();
    }
    rendered
}
