mod commands;

use clap::{Parser, Subcommand};
use commands::migrate;
use std::process::ExitCode;
use tabletop_core::{init_logging, AppConfig, AppConfigTrait};
use tabletop_migrations::MigrationRunner;

#[derive(Parser)]
#[command(name = "tabletop")]
#[command(about = "Database tooling for the tabletop point-of-sale")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database migration management
    Migrate {
        #[command(subcommand)]
        migrate_command: MigrateCommands,
    },
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Run pending migrations
    Up {
        /// Stop after this migration file (inclusive)
        #[arg(long)]
        target: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rollback the most recent migrations
    Down {
        /// Number of migrations to roll back
        #[arg(long, short, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
        steps: u64,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rollback every applied migration
    Reset {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show migration status
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a new migration
    Create {
        /// Migration name
        name: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = AppConfig::from_env()?;
    if let Err(err) = init_logging(&config.logging) {
        eprintln!("Warning: failed to initialize logging: {}", err);
    }

    match cli.command {
        Commands::Migrate { migrate_command } => match migrate_command {
            MigrateCommands::Up { target, json } => {
                migrate::up(&build_runner(&config)?, target.as_deref(), json).await
            }
            MigrateCommands::Down { steps, json } => {
                let steps = usize::try_from(steps)?;
                migrate::down(&build_runner(&config)?, steps, json).await
            }
            MigrateCommands::Reset { json } => migrate::reset(&build_runner(&config)?, json).await,
            MigrateCommands::Status { json } => migrate::status(&build_runner(&config)?, json).await,
            MigrateCommands::Create { name } => migrate::create(&config.migrations, &name),
        },
    }
}

fn build_runner(config: &AppConfig) -> anyhow::Result<MigrationRunner> {
    let runner = MigrationRunner::from_config(config)?;
    tracing::debug!(
        directory = %runner.loader().directory().display(),
        table = runner.tracker().table(),
        "Migration runner ready"
    );
    Ok(runner)
}
