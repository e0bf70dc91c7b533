//! `pubguard pause` / `pubguard resume` -- flip the global publish pause
//! flag directly in the main database, without going through a live
//! `Scheduler` (see the module doc on why).

use pubguard_core::config::Config;
use pubguard_core::domain::Actor;
use pubguard_core::storage::global_state;

use super::{setup, CliError};

pub async fn pause(config: &Config) -> Result<(), CliError> {
    let pool = setup::open_store(config).await?;
    let state = global_state::pause(&pool, &Actor::OperatorCli.to_string())
        .await
        .map_err(CliError::from)?;
    eprintln!(
        "Publishing paused by {} at {}.",
        state.paused_by.as_deref().unwrap_or("-"),
        state.paused_at.as_deref().unwrap_or("-")
    );
    Ok(())
}

pub async fn resume(config: &Config) -> Result<(), CliError> {
    let pool = setup::open_store(config).await?;
    global_state::resume(&pool).await.map_err(CliError::from)?;
    eprintln!("Publishing resumed.");
    Ok(())
}
