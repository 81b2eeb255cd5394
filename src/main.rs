mod commands;
mod error;
mod exec;
mod inputs;
mod migrations;
mod reporter;

use clap::{Parser, Subcommand};
use error::EfciError;

#[derive(Parser)]
#[command(name = "efci")]
#[command(about = "Migrate, test, and roll back EF Core databases in CI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations, run the test suite, and roll the
    /// migrations back if the tests fail
    Run {
        /// Override an input, e.g. --set skipTests=true (repeatable)
        #[arg(long = "set", short = 's', value_name = "NAME=VALUE")]
        set: Vec<String>,
    },

    /// Roll the database back to a specific migration
    Rollback {
        /// Migration name or id to roll back to ("0" reverts everything)
        #[arg(long)]
        target: String,

        /// Override an input, e.g. --set useGlobalDotnetEf=true (repeatable)
        #[arg(long = "set", short = 's', value_name = "NAME=VALUE")]
        set: Vec<String>,
    },

    /// Show the configuration a run would use
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Override an input, e.g. --set envName=Staging (repeatable)
        #[arg(long = "set", short = 's', value_name = "NAME=VALUE")]
        set: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), EfciError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { set } => {
            commands::run::run(set).await?;
        }
        Commands::Rollback { target, set } => {
            commands::rollback::run(&target, set).await?;
        }
        Commands::Config { json, set } => {
            commands::config::run(json, set).await?;
        }
    }

    Ok(())
}
