//! Inkwell CLI
//!
//! Main entry point for the inkwell command-line tool.
//! Indexes a project's documents and answers retrieval queries over them.

mod commands;

use clap::{Parser, Subcommand};
use commands::{ContextCommand, QueryCommand, StatusCommand};
use inkwell_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// Inkwell - hybrid retrieval over your project's documents
#[derive(Parser, Debug)]
#[command(name = "inkwell")]
#[command(about = "Hybrid keyword and semantic retrieval over project documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "INKWELL_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "INKWELL_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rank the workspace's passages for a query
    Query(QueryCommand),

    /// Assemble passages that fit a model's context window
    Context(ContextCommand),

    /// Index the workspace and show index statistics
    Status(StatusCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration from environment
    let mut config = AppConfig::load()?;

    // An explicit config file is merged on top of the workspace one
    if let Some(path) = &cli.config {
        config = config.merge_yaml(path)?;
    }

    // Apply CLI overrides
    let config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("Inkwell CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);

    let command_name = match &cli.command {
        Commands::Query(_) => "query",
        Commands::Context(_) => "context",
        Commands::Status(_) => "status",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    // Route to command handlers
    let result = match cli.command {
        Commands::Query(cmd) => cmd.execute(&config).await,
        Commands::Context(cmd) => cmd.execute(&config).await,
        Commands::Status(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
