//! Rendering histories and recall hits into prompt text.
//!
//! All budgets count characters, not bytes.

use colloq_types::{Message, Role, SemanticMatch};

/// Header for raw and windowed transcripts.
pub const HISTORY_HEADER: &str = "Previous conversation:\n";

/// Header for semantic recall context.
pub const SEMANTIC_HEADER: &str = "Related past conversation:\n";

/// Space held back when truncating the line that overflows the budget.
const OVERFLOW_RESERVE: usize = 50;

/// Minimum room left for a truncated history line to be kept.
const HISTORY_MIN_REMAINING: usize = 100;

/// Minimum room left for a truncated semantic line to be kept.
const SEMANTIC_MIN_REMAINING: usize = 50;

/// Per-message cap in the windowed view.
const WINDOW_MESSAGE_CAP: usize = 500;

/// First `n` characters of `s`.
pub fn truncate_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Accumulate lines under `max_chars`.
///
/// Each kept line costs its length plus one for the newline. The first line
/// that would overflow is cut to `max - total - 50` characters and marked with
/// `...`, but only when that leaves more than `min_remaining`; either way
/// nothing after it is kept.
fn budgeted_lines(
    lines: impl IntoIterator<Item = String>,
    max_chars: usize,
    min_remaining: usize,
) -> Vec<String> {
    let mut kept = Vec::new();
    let mut total = 0usize;

    for line in lines {
        let len = char_len(&line);
        if total + len > max_chars {
            if let Some(remaining) = max_chars.checked_sub(total + OVERFLOW_RESERVE)
                && remaining > min_remaining
            {
                kept.push(format!("{}...", truncate_chars(&line, remaining)));
            }
            break;
        }
        kept.push(line);
        total += len + 1;
    }

    kept
}

fn with_header(header: &str, lines: Vec<String>) -> String {
    if lines.is_empty() {
        return String::new();
    }
    format!("{header}{}", lines.join("\n"))
}

/// Render messages as `User: ...` / `Assistant: ...` lines under a budget.
pub fn format_history_for_prompt(messages: &[Message], max_chars: usize) -> String {
    let lines = messages
        .iter()
        .map(|m| format!("{}: {}", m.role.label(), m.content));
    with_header(
        HISTORY_HEADER,
        budgeted_lines(lines, max_chars, HISTORY_MIN_REMAINING),
    )
}

/// Render recall hits as `User: ...` / `Assistant: ...` lines under a budget.
pub fn format_semantic_context(entries: &[SemanticMatch], max_chars: usize) -> String {
    let lines = entries
        .iter()
        .map(|e| format!("{}: {}", e.role.label(), e.content));
    with_header(
        SEMANTIC_HEADER,
        budgeted_lines(lines, max_chars, SEMANTIC_MIN_REMAINING),
    )
}

/// Drop assistant turns that precede the first user turn.
pub fn skip_leading_assistant(messages: Vec<Message>) -> Vec<Message> {
    messages
        .into_iter()
        .skip_while(|m| m.role == Role::Assistant)
        .collect()
}

/// Render a windowed history.
///
/// Each message is capped at 500 characters (plus `...`). Lines are added
/// until the next one would exceed `max_chars`; there is no partial line.
pub fn format_window_history(messages: &[Message], max_chars: usize) -> String {
    let mut lines = Vec::new();
    let mut total = 0usize;

    for m in messages {
        let content = if char_len(&m.content) > WINDOW_MESSAGE_CAP {
            format!("{}...", truncate_chars(&m.content, WINDOW_MESSAGE_CAP))
        } else {
            m.content.clone()
        };
        let line = format!("{}: {}", m.role.label(), content);
        let len = char_len(&line);
        if total + len > max_chars {
            break;
        }
        lines.push(line);
        total += len + 1;
    }

    with_header(HISTORY_HEADER, lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(role: Role, content: &str) -> SemanticMatch {
        SemanticMatch {
            content: content.to_string(),
            role,
            timestamp: 0.0,
            distance: 0.1,
        }
    }

    #[test]
    fn test_empty_inputs_render_nothing() {
        assert_eq!(format_history_for_prompt(&[], 2000), "");
        assert_eq!(format_semantic_context(&[], 1000), "");
        assert_eq!(format_window_history(&[], 3000), "");
    }

    #[test]
    fn test_history_lines() {
        let messages = vec![Message::user("Is 10.0.0.1 up?"), Message::assistant("Yes.")];
        assert_eq!(
            format_history_for_prompt(&messages, 2000),
            "Previous conversation:\nUser: Is 10.0.0.1 up?\nAssistant: Yes."
        );
    }

    #[test]
    fn test_semantic_lines() {
        let entries = vec![hit(Role::User, "check NAT"), hit(Role::Assistant, "NAT is fine")];
        assert_eq!(
            format_semantic_context(&entries, 1000),
            "Related past conversation:\nUser: check NAT\nAssistant: NAT is fine"
        );
    }

    #[test]
    fn test_semantic_line_has_no_bullet() {
        let out = format_semantic_context(&[hit(Role::User, "check NAT")], 1000);
        assert_eq!(out, "Related past conversation:\nUser: check NAT");
    }

    #[test]
    fn test_history_overflow_truncates_with_room() {
        // "User: " + 294 chars = 300 per line, 301 with the newline.
        let messages: Vec<_> = (0..3).map(|_| Message::user("x".repeat(294))).collect();
        let out = format_history_for_prompt(&messages, 800);
        let lines: Vec<_> = out.lines().collect();

        // 602 used after two lines; remaining = 800 - 602 - 50 = 148 > 100.
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3].chars().count(), 148 + 3);
        assert!(lines[3].ends_with("..."));
    }

    #[test]
    fn test_history_overflow_without_room_stops() {
        let messages: Vec<_> = (0..3).map(|_| Message::user("x".repeat(294))).collect();
        // remaining = 700 - 602 - 50 = 48, too small.
        let out = format_history_for_prompt(&messages, 700);
        assert_eq!(out.lines().count(), 3);
        assert!(!out.ends_with("..."));
    }

    #[test]
    fn test_semantic_overflow_uses_smaller_minimum() {
        // "User: " + 94 chars = 100 per line.
        let entries: Vec<_> = (0..2).map(|_| hit(Role::User, &"y".repeat(94))).collect();
        // remaining = 180 - 101 - 50 = 29, dropped.
        assert_eq!(format_semantic_context(&entries, 180).lines().count(), 2);
        // remaining = 190 - 101 - 50 = 39, dropped.
        assert_eq!(format_semantic_context(&entries, 190).lines().count(), 2);

        let long: Vec<_> = (0..2).map(|_| hit(Role::User, &"y".repeat(194))).collect();
        // 200-char lines: remaining = 360 - 201 - 50 = 109 > 50, kept.
        let out = format_semantic_context(&long, 360);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2].chars().count(), 109 + 3);
    }

    #[test]
    fn test_first_line_can_be_truncated() {
        let messages = vec![Message::user("z".repeat(5000))];
        let out = format_history_for_prompt(&messages, 2000);
        let line = out.lines().nth(1).unwrap();
        assert_eq!(line.chars().count(), 1950 + 3);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn test_skip_leading_assistant() {
        let messages = vec![
            Message::assistant("orphan"),
            Message::assistant("orphan 2"),
            Message::user("q"),
            Message::assistant("a"),
        ];
        let kept = skip_leading_assistant(messages);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].role, Role::User);
    }

    #[test]
    fn test_window_caps_each_message() {
        let messages = vec![Message::user("w".repeat(800)), Message::assistant("short")];
        let out = format_window_history(&messages, 3000);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], "Previous conversation:");
        assert_eq!(lines[1].chars().count(), "User: ".len() + 500 + 3);
        assert_eq!(lines[2], "Assistant: short");
    }

    #[test]
    fn test_window_stops_at_budget() {
        let messages: Vec<_> = (0..10).map(|_| Message::user("v".repeat(494))).collect();
        // Each line is 500 chars; 5 fit in 3000 (5 * 501 = 2505), the 6th would not.
        let out = format_window_history(&messages, 3000);
        assert_eq!(out.lines().count(), 1 + 5);
    }
}
