//! Session commands - add, history, info, clear.

use anyhow::{Result, bail};
use clap::{Args, ValueEnum};
use colloq_memory::{ConversationMemory, Metadata, Role};
use console::{Style, style};

use super::{Context, format_timestamp, open_memory, print_header, truncate};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RoleArg {
    User,
    Assistant,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::User => Role::User,
            RoleArg::Assistant => Role::Assistant,
        }
    }
}

/// Arguments for the add command.
#[derive(Args, Debug)]
pub struct AddArgs {
    /// Session id
    pub session: String,

    /// Message text
    pub content: String,

    /// Who said it
    #[arg(short, long, value_enum, default_value = "user")]
    pub role: RoleArg,

    /// Metadata entry as key=value (repeatable; JSON values allowed)
    #[arg(short, long = "meta", value_name = "KEY=VALUE")]
    pub meta: Vec<String>,
}

/// Arguments for the history command.
#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Session id
    pub session: String,

    /// Maximum messages to show (default: all stored)
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Show the last N user/assistant pairs instead
    #[arg(short, long, conflicts_with = "limit")]
    pub window: Option<usize>,

    /// Print the prompt-ready transcript
    #[arg(long)]
    pub prompt: bool,
}

/// Arguments for the info command.
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Session id
    pub session: String,
}

/// Arguments for the clear command.
#[derive(Args, Debug)]
pub struct ClearArgs {
    /// Session id
    pub session: String,
}

/// Arguments for the clear-all command.
#[derive(Args, Debug)]
pub struct ClearAllArgs {
    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,
}

fn parse_metadata(entries: &[String]) -> Result<Option<Metadata>> {
    if entries.is_empty() {
        return Ok(None);
    }
    let mut metadata = Metadata::new();
    for entry in entries {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("Invalid metadata '{entry}', expected KEY=VALUE");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid metadata '{entry}', key is empty");
        }
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        metadata.insert(key.to_string(), value);
    }
    Ok(Some(metadata))
}

pub async fn run_add(args: AddArgs, ctx: &Context) -> Result<()> {
    let metadata = parse_metadata(&args.meta)?;
    let memory = open_memory(ctx).await?;
    let message = memory
        .add_message(&args.session, args.role.into(), args.content, metadata)
        .await;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&message)?);
    } else {
        println!(
            "{} {} message to {} ({})",
            Style::new().green().apply_to("Added"),
            message.role,
            style(&args.session).cyan(),
            memory.storage_kind()
        );
    }
    Ok(())
}

pub async fn run_history(args: HistoryArgs, ctx: &Context) -> Result<()> {
    let memory = open_memory(ctx).await?;
    let messages = match args.window {
        Some(window) => memory.get_window_history(&args.session, Some(window)).await,
        None => memory.get_session_history(&args.session, args.limit).await,
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    if args.prompt {
        let text = match args.window {
            Some(_) => memory.format_window_history(&messages, None),
            None => memory.format_history_for_prompt(&messages, None),
        };
        println!("{text}");
        return Ok(());
    }

    let dim = Style::new().dim();
    print_header(&format!("History: {}", args.session));
    if messages.is_empty() {
        println!("{}", dim.apply_to("No messages"));
        return Ok(());
    }
    for message in &messages {
        let role = match message.role {
            Role::User => style(message.role.label()).cyan(),
            Role::Assistant => style(message.role.label()).magenta(),
        };
        println!(
            "{} {}: {}",
            dim.apply_to(format_timestamp(message.timestamp)),
            role,
            if ctx.verbose {
                message.content.clone()
            } else {
                truncate(&message.content, 100)
            }
        );
    }
    println!();
    Ok(())
}

pub async fn run_info(args: InfoArgs, ctx: &Context) -> Result<()> {
    let memory = open_memory(ctx).await?;
    let info = memory.get_session_info(&args.session).await;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    print_header(&format!("Session: {}", info.session_id));
    if !info.exists {
        println!("{}", dim.apply_to("Session not found"));
        return Ok(());
    }
    println!("  Messages:    {}", style(info.message_count).cyan());
    println!("  User:        {}", info.user_message_count);
    println!("  Assistant:   {}", info.assistant_message_count);
    if let Some(first) = info.first_message_time {
        println!("  First:       {}", format_timestamp(first));
    }
    if let Some(last) = info.last_message_time {
        println!("  Last:        {}", format_timestamp(last));
    }
    println!("  Storage:     {}", info.storage_kind);
    println!();
    Ok(())
}

pub async fn run_clear(args: ClearArgs, ctx: &Context) -> Result<()> {
    let memory = open_memory(ctx).await?;
    let removed = memory.clear_session(&args.session).await;

    if ctx.json_output {
        println!(
            "{}",
            serde_json::json!({ "session_id": args.session, "removed": removed })
        );
    } else if removed {
        println!(
            "{} session {}",
            Style::new().green().apply_to("Cleared"),
            style(&args.session).cyan()
        );
    } else {
        println!(
            "{}",
            Style::new()
                .dim()
                .apply_to(format!("Session {} not found", args.session))
        );
    }
    Ok(())
}

pub async fn run_clear_all(args: ClearAllArgs, ctx: &Context) -> Result<()> {
    if !args.yes {
        bail!("Refusing to clear every session without --yes");
    }
    let memory = open_memory(ctx).await?;
    let count = memory.clear_all_sessions().await;

    if ctx.json_output {
        println!("{}", serde_json::json!({ "removed": count }));
    } else {
        println!(
            "{} {} session(s) from {} storage",
            Style::new().green().apply_to("Cleared"),
            count,
            memory.storage_kind()
        );
    }
    Ok(())
}

pub fn run_new_session(ctx: &Context) -> Result<()> {
    let id = ConversationMemory::new_session_id();
    if ctx.json_output {
        println!("{}", serde_json::json!({ "session_id": id }));
    } else {
        println!("{id}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metadata() {
        assert!(parse_metadata(&[]).unwrap().is_none());

        let entries = vec![
            "source=telegram".to_string(),
            "priority=3".to_string(),
            "tags=[\"a\",\"b\"]".to_string(),
        ];
        let metadata = parse_metadata(&entries).unwrap().unwrap();
        assert_eq!(metadata["source"], serde_json::json!("telegram"));
        assert_eq!(metadata["priority"], serde_json::json!(3));
        assert_eq!(metadata["tags"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn test_parse_metadata_rejects_malformed() {
        assert!(parse_metadata(&["novalue".to_string()]).is_err());
        assert!(parse_metadata(&["=x".to_string()]).is_err());
    }
}
