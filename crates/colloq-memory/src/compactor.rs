//! Summary compaction for long session histories.
//!
//! [`SummaryCompactor`] replaces a recent history that has grown past a
//! threshold with a short LLM-written summary, and caches it next to the
//! session. A cached summary is reused only while the session still holds
//! the same number of messages it was generated from.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use colloq_llm::{ChatMessage, CompletionRequest, SharedBackend};
use colloq_store::{HybridStore, KeyedStore, SummaryStore};
use colloq_types::{Message, Role, SummaryRecord};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{MemoryError, Result};
use crate::format::{format_history_for_prompt, truncate_chars};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Prefix on every generated summary.
pub const SUMMARY_PREFIX: &str = "Previous conversation summary: ";

/// Summaries shorter than this are replaced by [`smart_fallback_summary`].
pub const MIN_SUMMARY_CHARS: usize = 10;

/// Built-in summarization instructions.
pub const DEFAULT_SUMMARY_PROMPT: &str = "\
Summarize this conversation for context continuity.
IMPORTANT: Keep ALL device names, system names, IP addresses.
Identify what 'it/this/that' refers to.
Format: \"User discussing [TOPIC]. Current focus: [ENTITY]. Key details: [INFO]\"
Output only the summary.";

/// System names recognized by the fallback summary, in priority order.
const SYSTEM_KEYWORDS: [&str; 13] = [
    "Suricata",
    "pfSense",
    "Wazuh",
    "SIEM",
    "Zeek",
    "IRIS",
    "Router",
    "Firewall",
    "Server",
    "NAT",
    "Gateway",
    "Switch",
    "Elasticsearch",
];

const MAX_FALLBACK_IPS: usize = 5;
const MAX_FALLBACK_SYSTEMS: usize = 3;
const FALLBACK_QUESTION_CHARS: usize = 100;

static IPV4: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("IPv4 pattern is valid")
});

static SYSTEMS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    SYSTEM_KEYWORDS
        .iter()
        .map(|name| {
            let re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(name)))
                .expect("escaped keyword pattern is valid");
            (*name, re)
        })
        .collect()
});

// ─────────────────────────────────────────────────────────────────────────────
// Summarizer
// ─────────────────────────────────────────────────────────────────────────────

/// One turn handed to a [`Summarizer`], already truncated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryTurn {
    pub role: Role,
    pub content: String,
}

/// Produces a short summary of a conversation.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, turns: &[SummaryTurn]) -> Result<String>;

    fn name(&self) -> &str;
}

/// A summarizer shared across tasks.
pub type SharedSummarizer = Arc<dyn Summarizer>;

/// Settings for [`LlmSummarizer`].
#[derive(Debug, Clone)]
pub struct LlmSummarizerConfig {
    pub model: String,
    /// Target summary length.
    pub max_tokens: u32,
    pub temperature: f32,
    /// Replaces [`DEFAULT_SUMMARY_PROMPT`] when set.
    pub prompt: Option<String>,
}

impl Default for LlmSummarizerConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 100,
            temperature: 0.3,
            prompt: None,
        }
    }
}

/// [`Summarizer`] backed by a chat completion endpoint.
pub struct LlmSummarizer {
    backend: SharedBackend,
    config: LlmSummarizerConfig,
}

impl LlmSummarizer {
    pub fn new(backend: SharedBackend, config: LlmSummarizerConfig) -> Self {
        Self { backend, config }
    }

    fn prompt(&self) -> &str {
        self.config
            .prompt
            .as_deref()
            .unwrap_or(DEFAULT_SUMMARY_PROMPT)
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, turns: &[SummaryTurn]) -> Result<String> {
        let transcript = turns
            .iter()
            .map(|t| format!("{}: {}", t.role.label(), t.content))
            .collect::<Vec<_>>()
            .join("\n");

        debug!(
            turns = turns.len(),
            chars = transcript.len(),
            backend = self.backend.name(),
            "Requesting summary"
        );

        let request = CompletionRequest::new(
            &self.config.model,
            vec![
                ChatMessage::system(self.prompt()),
                ChatMessage::user(transcript),
            ],
            self.config.max_tokens,
        )
        .with_temperature(self.config.temperature);

        let response = self.backend.complete(request).await?;
        Ok(response.text().to_string())
    }

    fn name(&self) -> &str {
        self.backend.name()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Strip labels and fences LLMs like to wrap summaries in.
pub fn clean_summary(raw: &str) -> String {
    let mut s = raw.trim();

    if let Some(rest) = s.strip_prefix("```")
        && let Some(inner) = rest.strip_suffix("```")
    {
        s = inner.trim();
    }

    let unheaded = s.trim_start_matches('#').trim_start();
    for label in ["Summary:", "Summary -"] {
        if let Some(rest) = unheaded.strip_prefix(label) {
            s = rest.trim();
            break;
        }
    }

    s.to_string()
}

/// Build a summary from the messages themselves.
///
/// Combines the last user question (first 100 characters), up to three known
/// system names and up to five IPv4 addresses, joined by `" | "`. Returns
/// `"Ongoing conversation"` when none of those are found.
pub fn smart_fallback_summary(messages: &[Message]) -> String {
    let last_user = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| truncate_chars(&m.content, FALLBACK_QUESTION_CHARS).to_string())
        .filter(|q| !q.is_empty());

    let all_text = messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let mut ips: Vec<&str> = Vec::new();
    for found in IPV4.find_iter(&all_text) {
        if !ips.contains(&found.as_str()) {
            ips.push(found.as_str());
            if ips.len() == MAX_FALLBACK_IPS {
                break;
            }
        }
    }

    let systems: Vec<&str> = SYSTEMS
        .iter()
        .filter(|(_, re)| re.is_match(&all_text))
        .map(|(name, _)| *name)
        .take(MAX_FALLBACK_SYSTEMS)
        .collect();

    let mut parts = Vec::new();
    if let Some(question) = last_user {
        parts.push(format!("User asked: {question}"));
    }
    if !systems.is_empty() {
        parts.push(format!("Systems: {}", systems.join(", ")));
    }
    if !ips.is_empty() {
        parts.push(format!("IPs mentioned: {}", ips.join(", ")));
    }

    if parts.is_empty() {
        "Ongoing conversation".to_string()
    } else {
        parts.join(" | ")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Compactor
// ─────────────────────────────────────────────────────────────────────────────

/// Settings for [`SummaryCompactor`].
#[derive(Debug, Clone)]
pub struct CompactorConfig {
    /// When false the raw transcript is always returned.
    pub enabled: bool,
    /// Messages read for compaction.
    pub history_limit: usize,
    /// Histories longer than this are summarized.
    pub summarize_threshold: usize,
    /// Per-turn character cap on summarizer input.
    pub turn_char_cap: usize,
    /// Budget for the raw transcript.
    pub history_max_chars: usize,
    /// Upper bound on one summarizer call.
    pub timeout: Duration,
}

impl Default for CompactorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_limit: 6,
            summarize_threshold: 4,
            turn_char_cap: 200,
            history_max_chars: 2000,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Produces and caches condensed session histories.
pub struct SummaryCompactor {
    store: Arc<HybridStore>,
    summarizer: Option<SharedSummarizer>,
    config: CompactorConfig,
}

impl SummaryCompactor {
    pub fn new(
        store: Arc<HybridStore>,
        summarizer: Option<SharedSummarizer>,
        config: CompactorConfig,
    ) -> Self {
        Self {
            store,
            summarizer,
            config,
        }
    }

    pub fn config(&self) -> &CompactorConfig {
        &self.config
    }

    /// Name of the configured summarizer, if any.
    pub fn summarizer_name(&self) -> Option<&str> {
        self.summarizer.as_deref().map(|s| s.name())
    }

    /// History text for a prompt: raw when short, summarized when long.
    pub async fn get_compacted_history(&self, session_id: &str, force_refresh: bool) -> String {
        let messages = match self.store.read(session_id, self.config.history_limit).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(session_id, error = %e, "Failed to read history for compaction");
                return String::new();
            }
        };

        if messages.is_empty() {
            return String::new();
        }

        let raw = || format_history_for_prompt(&messages, self.config.history_max_chars);

        if !self.config.enabled || messages.len() <= self.config.summarize_threshold {
            return raw();
        }

        let current_count = match self.store.exists_and_count(session_id).await {
            Ok((_, count)) => count,
            Err(e) => {
                warn!(session_id, error = %e, "Failed to count session, using window size");
                messages.len()
            }
        };

        if !force_refresh {
            match self.store.get_summary(session_id).await {
                Ok(Some(record)) if record.is_valid_for(current_count) => {
                    debug!(session_id, count = current_count, "Using cached summary");
                    return record.summary_text;
                }
                Ok(Some(record)) => debug!(
                    session_id,
                    cached = record.message_count_at_generation,
                    count = current_count,
                    "Cached summary is stale"
                ),
                Ok(None) => {}
                Err(e) => warn!(session_id, error = %e, "Failed to read cached summary"),
            }
        }

        match self.generate(&messages).await {
            Ok(summary) => {
                if self
                    .unchanged_since(session_id, messages.last(), current_count)
                    .await
                {
                    let record = SummaryRecord::new(session_id, summary.as_str(), current_count);
                    if let Err(e) = self.store.put_summary(&record).await {
                        warn!(session_id, error = %e, "Failed to cache summary");
                    }
                } else {
                    debug!(session_id, "Session changed while summarizing, not caching");
                }
                summary
            }
            Err(e) => {
                warn!(session_id, error = %e, "Summarization failed, using raw transcript");
                raw()
            }
        }
    }

    /// Drop the cached summary for a session.
    pub async fn invalidate(&self, session_id: &str) -> bool {
        match self.store.invalidate_summary(session_id).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(session_id, error = %e, "Failed to invalidate summary");
                false
            }
        }
    }

    /// True when the session still ends with `last` and holds `count`
    /// messages. At the cap an append keeps the count, so the newest message
    /// is compared too.
    async fn unchanged_since(&self, session_id: &str, last: Option<&Message>, count: usize) -> bool {
        let newest = match self.store.read(session_id, 1).await {
            Ok(mut newest) => newest.pop(),
            Err(_) => return false,
        };
        let now = match self.store.exists_and_count(session_id).await {
            Ok((_, now)) => now,
            Err(_) => return false,
        };
        now == count && newest.as_ref() == last
    }

    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let summarizer = self
            .summarizer
            .as_ref()
            .ok_or_else(|| MemoryError::Summarizer("no summarizer configured".to_string()))?;

        let turns: Vec<SummaryTurn> = messages
            .iter()
            .map(|m| SummaryTurn {
                role: m.role,
                content: truncate_chars(&m.content, self.config.turn_char_cap).to_string(),
            })
            .collect();

        let text = tokio::time::timeout(self.config.timeout, summarizer.summarize(&turns))
            .await
            .map_err(|_| MemoryError::Timeout(self.config.timeout))??;

        let mut summary = clean_summary(&text);
        if summary.chars().count() < MIN_SUMMARY_CHARS {
            warn!(
                summarizer = summarizer.name(),
                chars = summary.chars().count(),
                "Summary too short, building fallback"
            );
            summary = smart_fallback_summary(messages);
        }

        info!(
            messages = messages.len(),
            chars = summary.chars().count(),
            "Generated summary"
        );
        Ok(format!("{SUMMARY_PREFIX}{summary}"))
    }
}
