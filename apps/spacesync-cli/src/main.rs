//! spacesync - keeps Google Chat Spaces in step with the Admin Console
//! OU tree
//!
//! One Space per organizational unit, membership mirrored from the
//! directory, and traversal-role holders granted visibility over their
//! whole subtree. Designed to run from cron or a systemd timer; every
//! invocation is one self-contained reconciliation pass.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod error;

use error::CliResult;

/// spacesync - OU to Chat Space reconciliation
#[derive(Parser)]
#[command(name = "spacesync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation pass, applying changes
    Run(commands::run::RunArgs),

    /// Compute and report what a pass would change, without applying
    Plan(commands::plan::PlanArgs),

    /// Validate configuration, catalog, and credentials
    Check(commands::check::CheckArgs),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::Plan(args) => commands::plan::execute(args).await,
        Commands::Check(args) => commands::check::execute(args).await,
    }
}
