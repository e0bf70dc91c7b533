//! Pubguard API server binary.
//!
//! Starts an HTTP server bridging pubguard-core's approval, scheduling, and
//! recovery services to a REST + SSE API (§6), and arms the publishing
//! scheduler for the lifetime of the process.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pubguard_core::adapters::facebook::FacebookAdapter;
use pubguard_core::adapters::instagram::InstagramAdapter;
use pubguard_core::adapters::AdapterRegistry;
use pubguard_core::approval::ApprovalService;
use pubguard_core::config::Config;
use pubguard_core::events::EventBus;
use pubguard_core::rate_limiter::RateLimiter;
use pubguard_core::recovery::RecoveryService;
use pubguard_core::scheduler::Scheduler;
use pubguard_core::storage;
use tracing_subscriber::EnvFilter;

use pubguard_server::auth;
use pubguard_server::state::AppState;

/// Pubguard API server -- serves the approval, publishing, and recovery API.
#[derive(Parser)]
#[command(name = "pubguard-server", version, about)]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value = "4000")]
    port: u16,

    /// Host address to bind to. Use 0.0.0.0 for LAN access.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Path to the pubguard configuration file.
    #[arg(short = 'c', long, default_value = "~/.pubguard/config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let config = Config::load(Some(&cli.config)).context("failed to load configuration")?;
    if let Err(errors) = config.validate() {
        for err in &errors {
            tracing::error!(error = %err, "invalid configuration");
        }
        anyhow::bail!("{} configuration error(s), see above", errors.len());
    }

    let config_dir = std::path::PathBuf::from(&cli.config)
        .parent()
        .map(std::path::Path::to_path_buf)
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    let media_dir = config_dir.join("media");

    tracing::info!(
        db = %config.storage.db_path,
        host = %cli.host,
        port = cli.port,
        "starting pubguard server"
    );

    let pool = storage::init_db(&config.storage.db_path).await?;
    let scheduler_pool = storage::init_scheduler_db(&config.storage.scheduler_db_path).await?;

    let api_token = auth::ensure_api_token(&config_dir)?;
    tracing::info!(token_path = %config_dir.join("api_token").display(), "API token ready");

    let bus = Arc::new(EventBus::new(
        config.events.sse_max_subscribers,
        config.events.event_buffer_size,
    ));

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

    let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limits));

    let approval = Arc::new(ApprovalService::new(pool.clone(), bus.clone()));

    let scheduler = Scheduler::new(
        pool.clone(),
        scheduler_pool,
        rate_limiter,
        adapters.clone(),
        approval.clone(),
        config.scheduler.clone(),
    );
    approval.attach_scheduler(scheduler.clone());
    scheduler.rehydrate().await.context("scheduler rehydration failed")?;
    scheduler.start_stale_monitor();

    let recovery = Arc::new(RecoveryService::new(pool, approval.clone(), adapters, bus.clone()));

    let state = Arc::new(AppState {
        approval,
        recovery,
        scheduler,
        events: bus,
        config,
        media_dir,
        api_token,
    });

    let router = pubguard_server::build_router(state);

    if cli.host == "0.0.0.0" {
        tracing::warn!("binding to 0.0.0.0 -- server accessible from the LAN");
    }

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", cli.host, cli.port)).await?;
    tracing::info!("listening on http://{}:{}", cli.host, cli.port);
    axum::serve(listener, router).await?;

    Ok(())
}
