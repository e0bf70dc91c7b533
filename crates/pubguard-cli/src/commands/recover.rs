//! `pubguard recover <draft-id>` -- request takedown of a published draft
//! (§4.6). Mirrors the bot webhook's `recover` action but runs inline and
//! prints the resulting recovery log before exiting.

use std::str::FromStr;

use clap::Args;
use pubguard_core::config::Config;
use pubguard_core::domain::{Actor, Urgency};

use super::{setup, CliError};

#[derive(Args)]
pub struct RecoverArgs {
    /// Id of the draft to recover.
    draft_id: String,

    /// Why this draft needs to come down.
    #[arg(long)]
    reason: String,

    /// How urgently this should be actioned: `immediate` or `review`.
    #[arg(long, default_value = "review")]
    urgency: String,
}

pub async fn execute(config: &Config, args: RecoverArgs) -> Result<(), CliError> {
    let urgency = Urgency::from_str(&args.urgency)
        .map_err(|e| CliError::Other(format!("invalid --urgency: {e}")))?;

    let pool = setup::open_store(config).await?;
    let approval = setup::approval_service(pool.clone());
    let recovery = setup::recovery_service(config, pool, approval);

    let log = recovery
        .recover(&args.draft_id, &args.reason, urgency, Actor::OperatorCli)
        .await
        .map_err(CliError::from)?;

    eprintln!(
        "Recovery {}: draft {} on {} -> {}",
        log.id, log.draft_id, log.platform, log.status
    );

    Ok(())
}
