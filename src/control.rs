//! Transport-agnostic control operations.
//!
//! Whatever hosts the coordinator (the `daemon` command, an RPC layer) maps
//! its requests onto [`ControlSurface`]. Out-of-band service commands use
//! the codes `128..=132`.

use crossbeam_channel::Sender;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::indexing::{CoordinatorStatus, IndexResult, RunCoordinator};

/// Service command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ServiceCommand {
    /// Liveness check, replies with the current status.
    Test = 128,
    Update = 129,
    Cleanup = 130,
    /// Stop the host, cancel any run and wait for it.
    Shutdown = 131,
    Cancel = 132,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("Unknown service command code {0}")]
    UnknownCode(u32),

    #[error("Unknown service command '{0}'")]
    UnknownName(String),
}

impl ServiceCommand {
    pub const ALL: [ServiceCommand; 5] = [
        Self::Test,
        Self::Update,
        Self::Cleanup,
        Self::Shutdown,
        Self::Cancel,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Update => "update",
            Self::Cleanup => "cleanup",
            Self::Shutdown => "shutdown",
            Self::Cancel => "cancel",
        }
    }
}

impl TryFrom<u32> for ServiceCommand {
    type Error = CommandParseError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|command| command.code() == code)
            .ok_or(CommandParseError::UnknownCode(code))
    }
}

/// Accepts a command name (any case) or its numeric code.
impl FromStr for ServiceCommand {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<u32>() {
            return Self::try_from(code);
        }
        Self::ALL
            .into_iter()
            .find(|command| command.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CommandParseError::UnknownName(s.to_string()))
    }
}

impl fmt::Display for ServiceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    Status(CoordinatorStatus),
    /// `false` when a run was already active.
    UpdateStarted(bool),
    CleanedUp(usize),
    CancelRequested,
    ShuttingDown,
}

impl fmt::Display for CommandReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => write!(
                f,
                "{} ({}/{} files, {}%)",
                status.phase, status.finished_files, status.total_files, status.percent
            ),
            Self::UpdateStarted(true) => write!(f, "update started"),
            Self::UpdateStarted(false) => write!(f, "update already running"),
            Self::CleanedUp(count) => write!(f, "cleaned up {count} interrupted documents"),
            Self::CancelRequested => write!(f, "cancel requested"),
            Self::ShuttingDown => write!(f, "shutting down"),
        }
    }
}

/// Control operations over one coordinator.
#[derive(Clone)]
pub struct ControlSurface {
    coordinator: RunCoordinator,
    shutdown: Option<Sender<()>>,
}

impl ControlSurface {
    pub fn new(coordinator: RunCoordinator) -> Self {
        Self {
            coordinator,
            shutdown: None,
        }
    }

    /// Signal `shutdown` when a [`ServiceCommand::Shutdown`] is executed.
    pub fn with_shutdown(mut self, shutdown: Sender<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn coordinator(&self) -> &RunCoordinator {
        &self.coordinator
    }

    pub fn is_update_running(&self) -> bool {
        self.coordinator.is_running()
    }

    pub fn start_update(&self) -> bool {
        self.coordinator.start_update()
    }

    pub fn cancel_update(&self) {
        self.coordinator.cancel_update();
    }

    pub fn cleanup(&self) -> IndexResult<usize> {
        self.coordinator.cleanup()
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.coordinator.status()
    }

    pub fn execute(&self, command: ServiceCommand) -> IndexResult<CommandReply> {
        crate::debug_event!("control", "command", "{command}");

        let reply = match command {
            ServiceCommand::Test => CommandReply::Status(self.status()),
            ServiceCommand::Update => CommandReply::UpdateStarted(self.start_update()),
            ServiceCommand::Cleanup => CommandReply::CleanedUp(self.cleanup()?),
            ServiceCommand::Cancel => {
                self.cancel_update();
                CommandReply::CancelRequested
            }
            ServiceCommand::Shutdown => {
                if let Some(shutdown) = &self.shutdown {
                    let _ = shutdown.send(());
                }
                self.cancel_update();
                self.coordinator.wait();
                crate::log_event!("control", "shutdown");
                CommandReply::ShuttingDown
            }
        };
        Ok(reply)
    }
}
