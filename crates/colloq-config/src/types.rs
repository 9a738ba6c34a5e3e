//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [storage]       # durable backend (Redis) connection and key layout
//! [memory]        # per-session limits and formatting budgets
//! [compaction]    # summary generation and caching
//! [semantic]      # sqlite-vec recall index
//! [embedding]     # embedder used by the recall index
//! [llm]           # chat completion endpoint used for summaries
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Built-in defaults shared by the config sections and their consumers.
pub mod defaults {
    pub const MAX_MESSAGES_PER_SESSION: usize = 20;
    pub const DEFAULT_HISTORY_LIMIT: usize = 6;
    pub const SESSION_TTL_SECS: u64 = 3600;
    pub const HISTORY_MAX_CHARS: usize = 2000;
    pub const SEMANTIC_MAX_CHARS: usize = 1000;
    pub const SEMANTIC_LIMIT: usize = 3;
    pub const WINDOW_SIZE: usize = 3;
    pub const WINDOW_MAX_CHARS: usize = 3000;

    pub const SESSION_PREFIX: &str = "conv:";
    pub const SUMMARY_PREFIX: &str = "summary:";
    pub const PROBE_TIMEOUT_SECS: u64 = 5;
    pub const OPERATION_TIMEOUT_SECS: u64 = 5;

    pub const SUMMARIZE_THRESHOLD: usize = 4;
    pub const TURN_CHAR_CAP: usize = 200;
    pub const SUMMARY_MAX_TOKENS: u32 = 100;
    pub const SUMMARY_TEMPERATURE: f32 = 0.3;
    pub const SUMMARY_TIMEOUT_SECS: u64 = 30;

    pub const SEMANTIC_DATABASE: &str = "semantic.db";
    pub const MOCK_EMBEDDING_DIMENSIONS: usize = 384;
    pub const OPENAI_EMBEDDING_DIMENSIONS: usize = 1536;

    pub const LLM_BASE_URL: &str = "https://api.openai.com/v1";
    pub const LLM_MODEL: &str = "gpt-4o-mini";
    pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
    pub const LLM_TIMEOUT_SECS: u64 = 60;
    pub const LLM_MAX_RETRIES: u32 = 2;
}

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. a project-local
/// override that only sets `[storage]`) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ColloqConfig {
    pub storage: Option<StorageConfig>,
    pub memory: Option<MemoryConfig>,
    pub compaction: Option<CompactionConfig>,
    pub semantic: Option<SemanticConfig>,
    pub embedding: Option<EmbeddingConfig>,
    pub llm: Option<LlmConfig>,
}

impl ColloqConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Merging is per section: a section present in `other` replaces the
    /// whole section here.
    pub fn merge(&mut self, other: ColloqConfig) {
        if other.storage.is_some() {
            self.storage = other.storage;
        }
        if other.memory.is_some() {
            self.memory = other.memory;
        }
        if other.compaction.is_some() {
            self.compaction = other.compaction;
        }
        if other.semantic.is_some() {
            self.semantic = other.semantic;
        }
        if other.embedding.is_some() {
            self.embedding = other.embedding;
        }
        if other.llm.is_some() {
            self.llm = other.llm;
        }
    }

    /// Effective storage section (defaults when absent).
    pub fn storage(&self) -> StorageConfig {
        self.storage.clone().unwrap_or_default()
    }

    /// Effective memory section (defaults when absent).
    pub fn memory(&self) -> MemoryConfig {
        self.memory.clone().unwrap_or_default()
    }

    /// Effective compaction section (defaults when absent).
    pub fn compaction(&self) -> CompactionConfig {
        self.compaction.clone().unwrap_or_default()
    }

    /// Effective semantic section (defaults when absent).
    pub fn semantic(&self) -> SemanticConfig {
        self.semantic.clone().unwrap_or_default()
    }

    /// Effective embedding section (defaults when absent).
    pub fn embedding(&self) -> EmbeddingConfig {
        self.embedding.clone().unwrap_or_default()
    }

    /// Effective llm section, if configured.
    pub fn llm(&self) -> Option<LlmConfig> {
        self.llm.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage
// ─────────────────────────────────────────────────────────────────────────────

/// Durable backend connection and key layout.
///
/// ```toml
/// [storage]
/// redis_url = "redis://127.0.0.1:6379"
/// session_prefix = "conv:"
/// summary_prefix = "summary:"
/// probe_timeout_secs = 5
/// operation_timeout_secs = 5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Redis connection URL. Absent means volatile-only operation.
    pub redis_url: Option<String>,
    pub session_prefix: String,
    pub summary_prefix: String,
    /// Timeout for the one-time liveness probe at construction.
    pub probe_timeout_secs: u64,
    /// Connect/response timeout for every durable operation.
    pub operation_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            session_prefix: defaults::SESSION_PREFIX.to_string(),
            summary_prefix: defaults::SUMMARY_PREFIX.to_string(),
            probe_timeout_secs: defaults::PROBE_TIMEOUT_SECS,
            operation_timeout_secs: defaults::OPERATION_TIMEOUT_SECS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory
// ─────────────────────────────────────────────────────────────────────────────

/// Per-session limits and prompt formatting budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// FIFO bound on stored messages per session.
    pub max_messages_per_session: usize,
    /// Messages returned by history reads when no limit is given.
    pub default_history_limit: usize,
    /// Sliding TTL applied to durable sessions and cached summaries.
    pub session_ttl_secs: u64,
    /// Character budget for the raw history transcript.
    pub history_max_chars: usize,
    /// Character budget for rendered semantic context.
    pub semantic_max_chars: usize,
    /// Matches returned by semantic recall when no limit is given.
    pub semantic_limit: usize,
    /// Number of user/assistant pairs in the windowed history view.
    pub window_size: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_messages_per_session: defaults::MAX_MESSAGES_PER_SESSION,
            default_history_limit: defaults::DEFAULT_HISTORY_LIMIT,
            session_ttl_secs: defaults::SESSION_TTL_SECS,
            history_max_chars: defaults::HISTORY_MAX_CHARS,
            semantic_max_chars: defaults::SEMANTIC_MAX_CHARS,
            semantic_limit: defaults::SEMANTIC_LIMIT,
            window_size: defaults::WINDOW_SIZE,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Compaction
// ─────────────────────────────────────────────────────────────────────────────

/// Summary generation settings.
///
/// ```toml
/// [compaction]
/// enabled = true
/// summarize_threshold = 4
/// turn_char_cap = 200
/// max_tokens = 100
/// temperature = 0.3
/// timeout_secs = 30
/// # prompt = "Summarize ..."
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// When false, compacted history is always the raw transcript.
    pub enabled: bool,
    /// Histories longer than this are summarized.
    pub summarize_threshold: usize,
    /// Per-turn character cap on summarizer input.
    pub turn_char_cap: usize,
    /// Target summary length in tokens.
    pub max_tokens: u32,
    pub temperature: f32,
    /// Upper bound on a single summarizer call.
    pub timeout_secs: u64,
    /// Override for the built-in summarization instructions.
    pub prompt: Option<String>,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            summarize_threshold: defaults::SUMMARIZE_THRESHOLD,
            turn_char_cap: defaults::TURN_CHAR_CAP,
            max_tokens: defaults::SUMMARY_MAX_TOKENS,
            temperature: defaults::SUMMARY_TEMPERATURE,
            timeout_secs: defaults::SUMMARY_TIMEOUT_SECS,
            prompt: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Semantic index
// ─────────────────────────────────────────────────────────────────────────────

/// Semantic recall index settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    pub enabled: bool,
    /// SQLite database path. Relative paths resolve against the data dir.
    pub database: Option<PathBuf>,
    /// Index messages on a detached task instead of inline.
    pub background: bool,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database: None,
            background: true,
        }
    }
}

impl SemanticConfig {
    /// Absolute database path.
    pub fn resolved_database(&self) -> PathBuf {
        let path = self
            .database
            .clone()
            .unwrap_or_else(|| PathBuf::from(defaults::SEMANTIC_DATABASE));
        if path.is_absolute() {
            path
        } else {
            crate::discovery::data_dir().join(path)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding
// ─────────────────────────────────────────────────────────────────────────────

/// Supported embedding providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic hash embedder, no network.
    #[default]
    Mock,
    /// OpenAI-compatible embeddings API.
    OpenAi,
}

/// Embedder configuration for the semantic index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    /// Output dimensions. Default depends on provider.
    pub dimensions: Option<usize>,
    /// Model name for the OpenAI provider.
    pub model: Option<String>,
    /// Custom base URL (for proxies or local gateways).
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Mock,
            dimensions: None,
            model: None,
            base_url: None,
            api_key_env: defaults::API_KEY_ENV.to_string(),
        }
    }
}

impl EmbeddingConfig {
    /// Effective dimensions for the configured provider.
    pub fn effective_dimensions(&self) -> usize {
        if let Some(d) = self.dimensions {
            return d;
        }
        match self.provider {
            EmbeddingProvider::Mock => defaults::MOCK_EMBEDDING_DIMENSIONS,
            EmbeddingProvider::OpenAi => defaults::OPENAI_EMBEDDING_DIMENSIONS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM
// ─────────────────────────────────────────────────────────────────────────────

/// OpenAI-compatible chat completion endpoint used for summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Plaintext API key. Prefer `api_key_env`.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::LLM_BASE_URL.to_string(),
            model: defaults::LLM_MODEL.to_string(),
            api_key_env: defaults::API_KEY_ENV.to_string(),
            api_key: None,
            timeout_secs: defaults::LLM_TIMEOUT_SECS,
            max_retries: defaults::LLM_MAX_RETRIES,
        }
    }
}

impl LlmConfig {
    /// Whether the config file itself carries a secret.
    pub fn has_plaintext_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Resolve the API key: plaintext value first, then the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.clone().filter(|k| !k.is_empty()) {
            return Some(key);
        }
        std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }
}
