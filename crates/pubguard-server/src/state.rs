//! Shared application state for the pubguard server.

use std::path::PathBuf;
use std::sync::Arc;

use pubguard_core::approval::ApprovalService;
use pubguard_core::config::Config;
use pubguard_core::events::EventBus;
use pubguard_core::recovery::RecoveryService;
use pubguard_core::scheduler::Scheduler;

/// Shared application state accessible by all route handlers.
pub struct AppState {
    /// The approval state machine -- every draft mutation routes through
    /// this, directly or via the recovery service.
    pub approval: Arc<ApprovalService>,
    /// Post-publish takedown service.
    pub recovery: Arc<RecoveryService>,
    /// The publishing scheduler, for global pause/resume.
    pub scheduler: Arc<Scheduler>,
    /// In-process event bus, shared with `approval`/`recovery`/`scheduler`
    /// but also held here directly so SSE handlers don't need to go through
    /// `approval` for it.
    pub events: Arc<EventBus>,
    /// Loaded configuration (platform credentials, tuning knobs).
    pub config: Config,
    /// Directory uploaded images are written to.
    pub media_dir: PathBuf,
    /// Local bearer token operators authenticate web/CLI requests with.
    pub api_token: String,
}
