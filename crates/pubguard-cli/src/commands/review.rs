//! `pubguard review` -- interactive review of drafts in `in_review` (§6 CLI
//! surface). Modeled on the source repo's `approve` command: iterate
//! pending items one at a time, read a single keystroke choice, report a
//! summary at the end.

use std::io::{self, BufRead, Write};

use pubguard_core::domain::{Actor, DraftStatus, Platform, PublishMode};
use pubguard_core::storage::drafts::DraftFilters;
use pubguard_core::storage::{drafts, DbPool};

use super::{setup, CliError};

pub async fn execute(config: &pubguard_core::config::Config) -> Result<(), CliError> {
    let pool = setup::open_store(config).await?;
    let approval = setup::approval_service(pool.clone());

    let pending = pending_drafts(&pool).await?;
    if pending.is_empty() {
        eprintln!("No drafts awaiting review.");
        return Ok(());
    }

    eprintln!("{} draft(s) to review.\n", pending.len());

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut reviewed = 0u32;
    let mut approved = 0u32;
    let mut rejected = 0u32;
    let mut skipped = 0u32;

    for (i, draft) in pending.iter().enumerate() {
        eprintln!("--- Draft {}/{} ({}) ---", i + 1, pending.len(), draft.id);
        eprintln!("  Client:   {}", draft.client_id);
        eprintln!("  Platform: {}", draft.platform);
        if let Some(score) = draft.voice_alignment_score {
            eprintln!("  Voice alignment: {score:.2}");
        }
        if let Some(suggested) = &draft.suggested_post_time {
            eprintln!("  Suggested post time: {suggested}");
        }
        eprintln!();
        for line in draft.body.lines() {
            eprintln!("    {line}");
        }
        eprintln!();
        eprint!("  [y]es / [n]o / [e]dit / [s]kip / [q]uit > ");
        io::stderr().flush().map_err(|e| CliError::Other(e.to_string()))?;

        let mut input = String::new();
        reader
            .read_line(&mut input)
            .map_err(|e| CliError::Other(e.to_string()))?;
        let choice = input.trim().to_lowercase();

        match choice.as_str() {
            "y" | "yes" => {
                approval
                    .approve(&draft.id, Actor::OperatorCli, PublishMode::Auto, None)
                    .await?;
                eprintln!("  -> Approved\n");
                approved += 1;
                reviewed += 1;
            }
            "n" | "no" => {
                approval
                    .reject(&draft.id, Actor::OperatorCli, vec![], None)
                    .await?;
                eprintln!("  -> Rejected\n");
                rejected += 1;
                reviewed += 1;
            }
            "e" | "edit" => {
                eprint!("  New copy > ");
                io::stderr().flush().map_err(|e| CliError::Other(e.to_string()))?;
                let mut new_copy = String::new();
                reader
                    .read_line(&mut new_copy)
                    .map_err(|e| CliError::Other(e.to_string()))?;
                approval
                    .edit(&draft.id, Actor::OperatorCli, new_copy.trim().to_string(), None)
                    .await?;
                eprintln!("  -> Edited, returned to in_review\n");
                reviewed += 1;
            }
            "q" | "quit" => {
                eprintln!("  -> Quitting review\n");
                break;
            }
            _ => {
                approval.skip(&draft.id, Actor::OperatorCli).await?;
                eprintln!("  -> Skipped\n");
                skipped += 1;
                reviewed += 1;
            }
        }
    }

    eprintln!(
        "Review complete: {reviewed} reviewed ({approved} approved, {rejected} rejected, {skipped} skipped)."
    );

    Ok(())
}

async fn pending_drafts(pool: &DbPool) -> Result<Vec<drafts::Draft>, CliError> {
    let filters = DraftFilters {
        statuses: vec![DraftStatus::InReview],
        client_id: None,
        platform: None::<Platform>,
    };
    drafts::list(pool, &filters).await.map_err(CliError::from)
}
