//! mnemos CLI: inspect and manage an agent's persisted memory.
//!
//! Commands:
//! - `stats`      — Per-store counts and settings
//! - `search`     — Semantic search over indexed results
//! - `entities`   — Query the entity graph
//! - `artifacts`  — List, read, or delete stored artifacts
//! - `summaries`  — Show stored session summaries
//! - `clear`      — Wipe memory (requires `--confirm`)
//! - `config`     — Print the effective configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "mnemos",
    about = "mnemos — memory and context layer for tool-using agents",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.mnemos/config.toml)
    #[arg(short, long, global = true, env = "MNEMOS_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show memory statistics
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search past tool results and analyses
    Search {
        query: String,

        /// Maximum results
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },

    /// Query known entities
    Entities {
        /// Substring of a name or alias
        query: Option<String>,

        /// Entity type, e.g. gene or protein
        #[arg(short = 't', long = "type")]
        entity_type: Option<String>,

        /// Include relationships of the first matches
        #[arg(short, long)]
        relationships: bool,
    },

    /// Manage stored artifacts
    Artifacts {
        #[command(subcommand)]
        action: ArtifactAction,
    },

    /// Show stored session summaries
    Summaries {
        /// Only this session
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Clear memory
    Clear {
        /// Actually clear
        #[arg(long)]
        confirm: bool,

        /// Only clear this session's summaries
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Subcommand)]
enum ArtifactAction {
    /// List artifacts, most recently used first
    List {
        /// Artifact type, e.g. table or plot
        #[arg(short = 't', long = "type")]
        artifact_type: Option<String>,

        /// Substring of name, description, or tags
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Print an artifact's content
    Read { id: String },

    /// Delete an artifact and its file
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load_config(cli.config.as_deref())?;
    tracing::debug!(memory_dir = %config.memory_dir.display(), "Configuration loaded");

    match cli.command {
        Commands::Stats { json } => commands::stats::run(config, json).await?,
        Commands::Search { query, limit } => commands::search::run(config, &query, limit).await?,
        Commands::Entities {
            query,
            entity_type,
            relationships,
        } => {
            commands::entities::run(config, query.as_deref(), entity_type.as_deref(), relationships).await?
        }
        Commands::Artifacts { action } => match action {
            ArtifactAction::List { artifact_type, query } => {
                commands::artifacts::list(config, artifact_type.as_deref(), query.as_deref()).await?
            }
            ArtifactAction::Read { id } => commands::artifacts::read(config, &id).await?,
            ArtifactAction::Delete { id } => commands::artifacts::delete(config, &id).await?,
        },
        Commands::Summaries { session } => commands::summaries::run(config, session.as_deref()).await?,
        Commands::Clear { confirm, session } => commands::clear::run(config, confirm, session).await?,
        Commands::Config => commands::config_cmd::show(&config)?,
    }

    Ok(())
}
