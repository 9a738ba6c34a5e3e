//! Colloq - conversation memory maintenance CLI
//!
//! Main entry point for the `colloq` binary.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{recall, session, stats};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Colloq - conversation memory for chat assistants
#[derive(Parser)]
#[command(name = "colloq")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Redis URL for the durable tier (overrides config)
    #[arg(long, global = true, env = "COLLOQ_REDIS_URL")]
    pub redis_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show storage tier, counts and limits
    Stats(stats::StatsArgs),

    /// Append a message to a session
    Add(session::AddArgs),

    /// Print a session's stored messages
    History(session::HistoryArgs),

    /// Show message counts and timestamps for a session
    Info(session::InfoArgs),

    /// Print the compacted history used in prompts
    Compact(recall::CompactArgs),

    /// Search a session's past messages by similarity
    Search(recall::SearchArgs),

    /// Remove one session
    Clear(session::ClearArgs),

    /// Remove every session
    ClearAll(session::ClearAllArgs),

    /// Print a fresh session id
    NewSession,
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable, stderr) + daily JSON file
    let filter = if cli.verbose {
        "colloq=debug,colloq_memory=debug,colloq_store=debug,colloq_index=debug,colloq_llm=debug,colloq_config=debug,warn"
    } else {
        "colloq=warn,colloq_memory=warn,colloq_store=warn,colloq_index=warn,colloq_llm=warn,error"
    };

    let log_dir = colloq_config::xdg_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "colloq.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "colloq=trace,colloq_memory=trace,colloq_store=trace,colloq_index=trace,colloq_llm=trace,colloq_config=trace,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        redis_url: cli.redis_url,
    };

    match cli.command {
        Commands::Stats(args) => stats::run(args, &ctx).await,
        Commands::Add(args) => session::run_add(args, &ctx).await,
        Commands::History(args) => session::run_history(args, &ctx).await,
        Commands::Info(args) => session::run_info(args, &ctx).await,
        Commands::Compact(args) => recall::run_compact(args, &ctx).await,
        Commands::Search(args) => recall::run_search(args, &ctx).await,
        Commands::Clear(args) => session::run_clear(args, &ctx).await,
        Commands::ClearAll(args) => session::run_clear_all(args, &ctx).await,
        Commands::NewSession => session::run_new_session(&ctx),
    }
}
