//! Match Magnet CLI - migrations, outbox maintenance and diagnostics.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! mm-cli migrate
//!
//! # Show outbox counts and the rows that stopped retrying
//! mm-cli outbox status
//!
//! # Replay pending outbox rows now
//! mm-cli outbox drain --limit 100
//!
//! # Remove photo drafts abandoned for more than a week
//! mm-cli staging prune --older-than-hours 168
//!
//! # Check the hosted store connection
//! mm-cli diagnose
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `outbox status` / `outbox drain` - Inspect and replay deferred writes
//! - `staging prune` - Remove abandoned photo drafts
//! - `diagnose` - Hosted store insert/delete round trip

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "mm-cli")]
#[command(author, version, about = "Match Magnet CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Inspect or replay the outbox of deferred hosted-store writes
    Outbox {
        #[command(subcommand)]
        action: OutboxAction,
    },
    /// Maintain photos staged by unpaid onboarding drafts
    Staging {
        #[command(subcommand)]
        action: StagingAction,
    },
    /// Probe the hosted store with a throwaway insert and delete
    Diagnose,
}

#[derive(Subcommand)]
enum StagingAction {
    /// Remove drafts not written to for a while
    Prune {
        /// Minimum draft age in hours
        #[arg(long, default_value_t = 168)]
        older_than_hours: u64,
    },
}

#[derive(Subcommand)]
enum OutboxAction {
    /// Show pending, stuck and delivered counts
    Status {
        /// How many stuck rows to list
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },
    /// Replay one batch of pending rows
    Drain {
        /// Maximum rows to replay
        #[arg(short, long, default_value_t = 100)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Outbox { action } => match action {
            OutboxAction::Status { limit } => commands::outbox::status(limit).await?,
            OutboxAction::Drain { limit } => commands::outbox::drain(limit).await?,
        },
        Commands::Staging { action } => match action {
            StagingAction::Prune { older_than_hours } => {
                commands::staging::prune(older_than_hours).await?;
            }
        },
        Commands::Diagnose => commands::diagnose::run().await?,
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_outbox_limits_default() {
        let cli = Cli::try_parse_from(["mm-cli", "outbox", "drain"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Outbox {
                action: OutboxAction::Drain { limit: 100 }
            }
        ));
    }

    #[test]
    fn test_staging_prune_age() {
        let cli = Cli::try_parse_from(["mm-cli", "staging", "prune"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Staging {
                action: StagingAction::Prune {
                    older_than_hours: 168
                }
            }
        ));

        let cli =
            Cli::try_parse_from(["mm-cli", "staging", "prune", "--older-than-hours", "2"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Staging {
                action: StagingAction::Prune {
                    older_than_hours: 2
                }
            }
        ));
    }
}
