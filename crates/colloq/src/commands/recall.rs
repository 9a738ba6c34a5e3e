//! Recall commands - compacted history and semantic search.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use super::{Context, open_memory, print_header, truncate};

/// Arguments for the compact command.
#[derive(Args, Debug)]
pub struct CompactArgs {
    /// Session id
    pub session: String,

    /// Ignore a cached summary and summarize again
    #[arg(long)]
    pub refresh: bool,
}

/// Arguments for the search command.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Session id
    pub session: String,

    /// Search query
    pub query: String,

    /// Maximum results to return
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Print the prompt-ready context block
    #[arg(long)]
    pub prompt: bool,
}

pub async fn run_compact(args: CompactArgs, ctx: &Context) -> Result<()> {
    let memory = open_memory(ctx).await?;
    let text = memory
        .get_compacted_history(&args.session, args.refresh)
        .await;

    if ctx.json_output {
        println!(
            "{}",
            serde_json::json!({ "session_id": args.session, "history": text })
        );
    } else if text.is_empty() {
        println!("{}", Style::new().dim().apply_to("No messages"));
    } else {
        println!("{text}");
    }
    Ok(())
}

pub async fn run_search(args: SearchArgs, ctx: &Context) -> Result<()> {
    let memory = open_memory(ctx).await?;
    let dim = Style::new().dim();

    if ctx.verbose {
        println!(
            "{}",
            dim.apply_to(format!(
                "Searching {}: \"{}\" (limit: {})",
                args.session,
                args.query,
                args.limit
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "default".to_string())
            ))
        );
        println!();
    }

    let matches = memory
        .get_semantic_context(&args.session, &args.query, args.limit)
        .await;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }

    if args.prompt {
        println!("{}", memory.format_semantic_context(&matches, None));
        return Ok(());
    }

    if matches.is_empty() {
        println!("{}", dim.apply_to("No results found"));
        return Ok(());
    }

    print_header("Search Results");
    for (i, hit) in matches.iter().enumerate() {
        println!(
            "{}. {}: {}",
            style(i + 1).cyan(),
            hit.role.label(),
            truncate(&hit.content, 70)
        );
        println!("   {}", dim.apply_to(format!("(distance: {:.3})", hit.distance)));
        println!();
    }
    Ok(())
}
