//! # docbatch CLI
//!
//! The `docbatch` binary drives batch keyword interchange against a
//! document repository: queries by keyword, archive imports of new
//! documents, and keyword reindexing of existing ones.
//!
//! ## Usage
//!
//! ```bash
//! docbatch --config ./config/docbatch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docbatch init` | Create the repository database and run schema migrations |
//! | `docbatch load-schema <file>` | Import groups, document types, keyword types and file types |
//! | `docbatch export-config` | Write the `config.json` schema dump |
//! | `docbatch query` | Run `query.json` |
//! | `docbatch archive` | Run `archive.json` |
//! | `docbatch reindex` | Run `reindex.json` |
//! | `docbatch run <file>` | Run a descriptor file; its name selects the operation |

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use docbatch::batch_cmd::{self, RunOptions};
use docbatch::{catalog_cmd, config, logging, migrate};
use docbatch_core::executor::Operation;

/// docbatch: batch keyword interchange for document repositories.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docbatch.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docbatch",
    about = "Batch keyword interchange for document repositories",
    version,
    long_about = "docbatch reads JSON batch descriptors and runs them against a document \
    repository: keyword queries, archive imports with typed keywords, and keyword reindexing \
    under an exclusive document lock."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docbatch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the repository database schema.
    ///
    /// Idempotent: running it again leaves existing data in place.
    Init,

    /// Import a schema definition into the repository.
    ///
    /// Names that already exist are left untouched.
    LoadSchema {
        /// Path to the schema definition JSON.
        file: PathBuf,
    },

    /// Write every group, document type and keyword schema to `config.json`.
    ExportConfig {
        /// Output path. Defaults to `<batch.directory>/<batch.config_file>`.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Run the query descriptor file.
    Query(BatchArgs),

    /// Run the archive descriptor file.
    Archive(BatchArgs),

    /// Run the reindex descriptor file.
    Reindex(BatchArgs),

    /// Run a descriptor file; its name selects query, archive or reindex.
    Run {
        /// Descriptor file. A bare name is looked up in `batch.directory`.
        file: PathBuf,

        #[command(flatten)]
        args: BatchArgs,
    },
}

#[derive(Args, Clone, Copy)]
struct BatchArgs {
    /// Print the report as JSON.
    #[arg(long)]
    json: bool,

    /// Process only the first N descriptors.
    #[arg(long)]
    limit: Option<usize>,
}

impl From<BatchArgs> for RunOptions {
    fn from(args: BatchArgs) -> Self {
        RunOptions {
            json: args.json,
            limit: args.limit,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Repository initialized successfully.");
        }
        Commands::LoadSchema { file } => {
            catalog_cmd::run_load_schema(&cfg, &file).await?;
        }
        Commands::ExportConfig { output } => {
            catalog_cmd::run_export_config(&cfg, output).await?;
        }
        Commands::Query(args) => {
            batch_cmd::run_operation(&cfg, Operation::Query, args.into()).await?;
        }
        Commands::Archive(args) => {
            batch_cmd::run_operation(&cfg, Operation::Archive, args.into()).await?;
        }
        Commands::Reindex(args) => {
            batch_cmd::run_operation(&cfg, Operation::Reindex, args.into()).await?;
        }
        Commands::Run { file, args } => {
            batch_cmd::run_file(&cfg, &file, args.into()).await?;
        }
    }

    Ok(())
}
