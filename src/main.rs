//! # code-eval CLI (`ceval`)
//!
//! Chunked, cached LLM analysis of files, folders and repositories.
//!
//! ## Usage
//!
//! ```bash
//! ceval --config ./config/ceval.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ceval analyze <scope> <mode> <path>` | Analyze a file, folder or repository |
//! | `ceval clone <url>` | Clone a repository if it is not already present |
//! | `ceval flush` | Remove all cached results (and clones with `--repos`) |
//! | `ceval languages` | List supported file extensions |
//! | `ceval serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Describe one file
//! ceval analyze file description src/main.rs
//!
//! # Security review of a folder, ignoring cached results
//! ceval analyze folder security ./src --force
//!
//! # Quality review of a remote repository
//! ceval analyze repo quality https://github.com/org/tool.git
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use code_eval::commands;
use code_eval::config;
use code_eval::mode::AnalysisMode;
use code_eval::orchestrator::Scope;
use code_eval::server;

/// Chunked, cached LLM code analysis.
///
/// Settings are read from the `--config` TOML file; a missing file means
/// defaults for every section.
#[derive(Parser)]
#[command(
    name = "ceval",
    about = "Chunked, cached LLM analysis of files, folders and repositories",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ceval.toml")]
    config: PathBuf,

    /// Debug-level logging.
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Errors only.
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a target and print the result as JSON.
    ///
    /// Results are served from the cache when present. Directory results
    /// list any files that failed under `failures`.
    Analyze {
        /// `file`, `folder` or `repo`.
        scope: Scope,
        /// `description`, `quality` or `security`.
        mode: AnalysisMode,
        /// Target path. For `repo`, a git URL is cloned first.
        path: String,
        /// Ignore cached results and recompute.
        #[arg(long)]
        force: bool,
    },

    /// Clone a repository unless already present; prints the local path.
    Clone { url: String },

    /// Remove all cached results for every mode.
    Flush {
        /// Also remove every cloned repository.
        #[arg(long)]
        repos: bool,
    },

    /// List supported file extensions.
    Languages,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    if let Commands::Languages = cli.command {
        commands::list_languages();
        return Ok(());
    }

    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Analyze {
            scope,
            mode,
            path,
            force,
        } => {
            commands::run_analyze(&cfg, scope, mode, &path, force).await?;
        }
        Commands::Clone { url } => {
            commands::run_clone(&cfg, &url)?;
        }
        Commands::Flush { repos } => {
            commands::run_flush(&cfg, repos).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Languages => {}
    }

    Ok(())
}

fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("CEVAL_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
