//! Stats command - storage tier, counts and limits.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use super::{Context, open_memory, print_header};

/// Arguments for the stats command.
#[derive(Args, Debug)]
pub struct StatsArgs {}

/// Run the stats command.
pub async fn run(_args: StatsArgs, ctx: &Context) -> Result<()> {
    let memory = open_memory(ctx).await?;
    let stats = memory.get_stats().await;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    let green = Style::new().green();
    let red = Style::new().red();

    print_header("Storage");
    println!("  Tier:        {}", style(stats.storage_kind).cyan());
    let reachable = if stats.durable_reachable {
        green.apply_to("reachable")
    } else {
        red.apply_to("unreachable")
    };
    println!("  Redis:       {reachable}");
    match stats.durable_session_count {
        Some(count) => println!("  Sessions:    {} (redis)", style(count).cyan()),
        None => println!(
            "  Sessions:    {} (in-process)",
            style(stats.volatile_session_count).cyan()
        ),
    }
    if stats.volatile_message_count > 0 {
        println!(
            "  Local msgs:  {}",
            style(stats.volatile_message_count).cyan()
        );
    }
    println!();

    print_header("Recall");
    if stats.semantic_enabled {
        println!("  Index:       {}", green.apply_to("enabled"));
        println!("  Entries:     {}", style(stats.semantic_entry_count).cyan());
    } else {
        println!("  Index:       {}", dim.apply_to("(disabled)"));
    }
    match &stats.summarizer {
        Some(name) => println!("  Summarizer:  {}", style(name).cyan()),
        None => println!("  Summarizer:  {}", dim.apply_to("(none, fallback only)")),
    }
    println!();

    print_header("Limits");
    println!("  Max messages per session: {}", stats.max_messages_per_session);
    println!("  Session TTL:              {}s", stats.session_ttl_secs);
    println!("  Default history limit:    {}", stats.default_history_limit);
    println!("  Summarize above:          {} messages", stats.summarize_threshold);
    println!();

    Ok(())
}
