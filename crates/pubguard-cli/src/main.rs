//! Pubguard operator CLI.
//!
//! One of three external edges over the approval, publishing, and recovery
//! core (§6), alongside the web/SSE API and the chat-bot webhook. Every
//! subcommand here routes through the same `ApprovalService`/
//! `RecoveryService` the other two edges use -- there is no separate write
//! path.
mod commands;

use clap::Parser;
use pubguard_core::config::Config;
use tracing_subscriber::EnvFilter;

/// Operator CLI for the approval, publishing, and recovery core.
#[derive(Parser)]
#[command(name = "pubguard")]
#[command(version)]
#[command(about = "Review, recover, and pause/resume the publishing pipeline")]
struct Cli {
    /// Path to config.toml.
    #[arg(short = 'c', long, global = true, default_value = "~/.pubguard/config.toml")]
    config: String,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Iterate drafts in `in_review`, prompting approve/edit/reject/skip.
    Review,
    /// Take a published draft down and record the recovery attempt.
    Recover(commands::recover::RecoverArgs),
    /// Halt the executor's dispatch step; queued entries keep scheduling.
    Pause,
    /// Resume dispatch after a pause.
    Resume,
}

/// Exit codes (§6 CLI surface): 0 success, 2 invalid arguments (clap's own
/// default), 3 store unavailable, 4 conflict -- the latter two come back
/// from `CliError::exit_code` once a subcommand runs.
const EXIT_STORE_UNAVAILABLE: i32 = 3;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("pubguard=debug,pubguard_core=debug,info")
    } else {
        EnvFilter::new("pubguard=info,pubguard_core=info,warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();

    let config = match Config::load(Some(&cli.config)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            eprintln!("hint: run the server once to generate a default config, or pass --config");
            std::process::exit(EXIT_STORE_UNAVAILABLE);
        }
    };

    let outcome = match cli.command {
        Commands::Review => commands::review::execute(&config).await,
        Commands::Recover(args) => commands::recover::execute(&config, args).await,
        Commands::Pause => commands::pause_resume::pause(&config).await,
        Commands::Resume => commands::pause_resume::resume(&config).await,
    };

    if let Err(err) = outcome {
        eprintln!("error: {err}");
        std::process::exit(err.exit_code());
    }
}
