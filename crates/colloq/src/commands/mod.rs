//! CLI command handlers.

pub mod recall;
pub mod session;
pub mod stats;

use anyhow::Result;
use colloq_memory::ConversationMemory;
use console::{Style, style};
use tracing::warn;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Redis URL given on the command line.
    pub redis_url: Option<String>,
}

/// Build the memory service from discovered config plus CLI overrides.
pub async fn open_memory(ctx: &Context) -> Result<ConversationMemory> {
    let loaded = colloq_config::load_config(None)?;
    for warning in &loaded.warnings {
        warn!("{warning}");
    }
    let mut config = loaded.config;

    if let Some(url) = ctx.redis_url.as_deref().filter(|u| !u.trim().is_empty()) {
        let mut storage = config.storage();
        storage.redis_url = Some(url.to_string());
        config.storage = Some(storage);
    }

    // The process exits right after the command, so a detached indexing
    // task would be dropped.
    let mut semantic = config.semantic();
    semantic.background = false;
    config.semantic = Some(semantic);

    Ok(ConversationMemory::from_config(&config).await)
}

/// Print a bold title with a rule under it.
pub fn print_header(title: &str) {
    let dim = Style::new().dim();
    println!("{}", style(title).bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    println!();
}

/// Render an epoch timestamp as local time.
pub fn format_timestamp(ts: f64) -> String {
    let secs = ts.trunc() as i64;
    let nanos = (ts.fract() * 1e9) as u32;
    match chrono::DateTime::from_timestamp(secs, nanos) {
        Some(dt) => dt
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => format!("{ts:.3}"),
    }
}

/// Truncate a string for one-line display.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer line of text", 10), "a longe...");
        assert_eq!(truncate("ééééééé", 5), "éé...");
    }

    #[test]
    fn test_format_timestamp() {
        let formatted = format_timestamp(1_700_000_000.25);
        assert_eq!(formatted.len(), "2023-11-14 22:13:20".len());
        assert!(formatted.starts_with("2023-11-1"));
    }
}
