//! CLI subcommand implementations.
//!
//! Each module owns one subcommand; `setup` assembles the core services
//! every subcommand needs (approval, recovery) against the configured
//! store. The CLI deliberately does not construct a live [`Scheduler`] --
//! doing so would rehydrate and re-arm every pending fire a second time
//! alongside whatever server process already has them armed. Approvals made
//! here fall back to `ApprovalService`'s direct queue insert (no cadence
//! adjustment), the same fallback path its own unit tests rely on; operators
//! who need cadence-adjusted scheduling use the web or bot surface, which
//! talk to the server process that owns the live `Scheduler`.
//!
//! [`Scheduler`]: pubguard_core::scheduler::Scheduler

pub mod pause_resume;
pub mod recover;
pub mod review;
mod setup;

use pubguard_core::error::{RecoveryError, StorageError, TransitionError};

/// Maps a core error to the CLI's exit-code taxonomy (§6): 3 for a store
/// that cannot be reached, 4 for a conflicting concurrent write, 1 for
/// everything else (not-found, invalid transition/state).
pub enum CliError {
    StoreUnavailable(String),
    Conflict(String),
    Other(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::StoreUnavailable(_) => 3,
            CliError::Conflict(_) => 4,
            CliError::Other(_) => 1,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::StoreUnavailable(m) | CliError::Conflict(m) | CliError::Other(m) => {
                write!(f, "{m}")
            }
        }
    }
}

impl From<StorageError> for CliError {
    fn from(err: StorageError) -> Self {
        CliError::StoreUnavailable(err.to_string())
    }
}

impl From<TransitionError> for CliError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::Conflict { .. } => CliError::Conflict(err.to_string()),
            TransitionError::StoreUnavailable { .. } => CliError::StoreUnavailable(err.to_string()),
            _ => CliError::Other(err.to_string()),
        }
    }
}

impl From<RecoveryError> for CliError {
    fn from(err: RecoveryError) -> Self {
        match err {
            RecoveryError::StoreUnavailable { .. } => CliError::StoreUnavailable(err.to_string()),
            _ => CliError::Other(err.to_string()),
        }
    }
}
