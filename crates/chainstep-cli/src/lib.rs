//! chainstep - Operator console for checkpointed deployments and migrations
//!
//! This CLI gives operators a terminal interface to:
//! - Run the declared deployment plan against an environment
//! - Migrate a record dataset in gated batches
//! - Re-verify deployed artifacts on the environment's explorer
//! - Inspect the ledger document and validate datasets offline

use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod gate;
pub mod output;
pub mod verifier;

use commands::{deploy, ledger, migrate, status, validate, verify, Context};
use config::CliConfig;
pub use error::{CliError, CliResult};

/// chainstep CLI application
#[derive(Parser)]
#[command(name = "chainstep")]
#[command(about = "chainstep - Checkpointed deployment and migration console", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CHAINSTEP_CONFIG")]
    config: Option<String>,

    /// Target environment name
    #[arg(short, long = "env", env = "CHAINSTEP_ENV")]
    environment: Option<String>,

    /// Override the environment's chain gateway endpoint
    #[arg(long, env = "CHAINSTEP_GATEWAY")]
    gateway: Option<String>,

    /// Output format (table, json, yaml)
    #[arg(short, long, default_value = "table")]
    output: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Show the active environment and ledger summary
    Status,

    /// Run the deployment plan, skipping completed steps
    Deploy {
        /// Force a fresh deployment of one step
        #[arg(long, value_name = "STEP")]
        redeploy: Option<String>,

        /// Do not submit explorer verification
        #[arg(long)]
        skip_verify: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Migrate the record dataset in gated batches
    Migrate {
        /// Dataset file (defaults to the configured path)
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Records per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Start at this record index
        #[arg(long, conflicts_with = "resume")]
        offset: Option<usize>,

        /// Continue after the records already migrated
        #[arg(long)]
        resume: bool,

        /// Print the batch plan without submitting
        #[arg(long)]
        dry_run: bool,
    },

    /// Submit explorer verification for a deployed artifact
    Verify {
        /// Artifact name from the ledger
        artifact: String,
    },

    /// Inspect the ledger document
    Ledger {
        #[command(subcommand)]
        command: ledger::LedgerCommands,
    },

    /// Validate a dataset offline
    Validate {
        /// Dataset file (defaults to the configured path)
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Records per batch
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

/// Parse process arguments and run
pub async fn run() -> CliResult<()> {
    run_with_args(std::env::args_os()).await
}

/// Parse the given arguments and run
pub async fn run_with_args<I, T>(args: I) -> CliResult<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };

    // Logs on stderr, command output on stdout
    let filter = if cli.verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .try_init();

    let config = CliConfig::load(cli.config.as_deref())?;
    let environment = config.environment_name(cli.environment.as_deref());
    let ctx = Context {
        config,
        environment,
        gateway: cli.gateway,
        format: cli.output,
    };

    match cli.command {
        Commands::Status => status::execute(&ctx).await,
        Commands::Deploy { redeploy, skip_verify, yes } => {
            deploy::execute(&ctx, deploy::DeployArgs { redeploy, skip_verify, yes }).await
        }
        Commands::Migrate { dataset, batch_size, offset, resume, dry_run } => {
            let args = migrate::MigrateArgs { dataset, batch_size, offset, resume, dry_run };
            migrate::execute(&ctx, args).await
        }
        Commands::Verify { artifact } => verify::execute(&ctx, &artifact).await,
        Commands::Ledger { command } => ledger::execute(command, &ctx).await,
        Commands::Validate { dataset, batch_size } => validate::execute(&ctx, dataset, batch_size),
    }
}
