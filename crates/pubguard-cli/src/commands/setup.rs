//! Wires the core services a CLI subcommand needs against the configured
//! store, without touching the scheduler's fire-time database (see the
//! module doc on why the CLI never constructs a live `Scheduler`).

use std::sync::Arc;
use std::time::Duration;

use pubguard_core::adapters::facebook::FacebookAdapter;
use pubguard_core::adapters::instagram::InstagramAdapter;
use pubguard_core::adapters::AdapterRegistry;
use pubguard_core::approval::ApprovalService;
use pubguard_core::config::Config;
use pubguard_core::events::EventBus;
use pubguard_core::recovery::RecoveryService;
use pubguard_core::storage::{self, DbPool};

use super::CliError;

pub async fn open_store(config: &Config) -> Result<DbPool, CliError> {
    storage::init_db(&config.storage.db_path)
        .await
        .map_err(CliError::from)
}

pub fn approval_service(pool: DbPool) -> Arc<ApprovalService> {
    // No SSE subscribers ever attach from the CLI; a small private bus just
    // satisfies ApprovalService's audit-event publish step.
    let bus = Arc::new(EventBus::new(1, 16));
    Arc::new(ApprovalService::new(pool, bus))
}

pub fn recovery_service(config: &Config, pool: DbPool, approval: Arc<ApprovalService>) -> Arc<RecoveryService> {
    let dispatch_timeout = Duration::from_secs(config.scheduler.dispatch_timeout_seconds);
    let facebook = Arc::new(FacebookAdapter::new(
        config.platforms.facebook.access_token.clone().unwrap_or_default(),
        dispatch_timeout,
    ));
    let instagram = Arc::new(InstagramAdapter::new(
        config.platforms.instagram.access_token.clone().unwrap_or_default(),
        dispatch_timeout,
    ));
    let adapters = Arc::new(AdapterRegistry::new(facebook, instagram));
    Arc::new(RecoveryService::new(pool, approval.clone(), adapters, approval.event_bus().clone()))
}
