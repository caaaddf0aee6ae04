//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module. [`Workspace`] opens the
//! persisted index and ledger the commands share.

pub mod daemon;
pub mod init;
pub mod status;
pub mod update;

use anyhow::Context;
use std::sync::Arc;

use crate::config::Settings;
use crate::indexing::{LogObserver, RunCoordinator};
use crate::ledger::{FileLedger, Ledger};
use crate::resolver::TextResolver;
use crate::store::MemoryStore;

/// Index, ledger and settings of one workspace.
pub struct Workspace {
    pub settings: Settings,
    pub store: MemoryStore,
    pub ledger: Arc<FileLedger>,
}

impl Workspace {
    pub fn open(settings: Settings) -> anyhow::Result<Self> {
        let index_path = settings.resolve_path(&settings.index_path);
        let ledger_path = settings.resolve_path(&settings.ledger_path);

        let store = MemoryStore::open(&index_path)
            .with_context(|| format!("Failed to open index {}", index_path.display()))?;
        let ledger = FileLedger::open(&ledger_path)
            .with_context(|| format!("Failed to open ledger {}", ledger_path.display()))?;

        tracing::debug!(
            target: "cli",
            "workspace opened: {} documents, {} in-flight entries",
            store.document_count(),
            ledger.all().len()
        );

        Ok(Self {
            settings,
            store,
            ledger: Arc::new(ledger),
        })
    }

    /// Coordinator over this workspace with the configured resolvers.
    pub fn coordinator(&self) -> RunCoordinator {
        let coordinator = RunCoordinator::from_settings(
            &self.settings,
            Arc::new(self.store.clone()),
            self.ledger.clone(),
        );

        let text = &self.settings.resolvers.text;
        if text.enabled {
            coordinator.register_resolver(Arc::new(TextResolver::from_config(text)));
        }
        coordinator.add_observer(Arc::new(LogObserver));
        coordinator
    }
}
