//! The conversation memory façade.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use colloq_config::{
    ColloqConfig, CompactionConfig, EmbeddingConfig, EmbeddingProvider, LlmConfig, MemoryConfig,
    defaults,
};
use colloq_index::SemanticIndex;
use colloq_llm::{
    MockEmbedder, OpenAiBackend, OpenAiConfig, OpenAiEmbedder, OpenAiEmbedderConfig,
    SharedEmbedder,
};
use colloq_store::{HybridStore, KeyedStore, SharedDurableBackend, StoreConfig};
use colloq_types::{Message, Metadata, Role, SemanticMatch, SessionId, StorageKind};
use parking_lot::Mutex;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

use crate::compactor::{
    CompactorConfig, LlmSummarizer, LlmSummarizerConfig, SharedSummarizer, SummaryCompactor,
};
use crate::format;
use crate::stats::{MemoryStats, SessionInfo};

/// Messages returned by [`ConversationMemory::get_session_history`] by default.
pub const SESSION_HISTORY_LIMIT: usize = 100;

static GLOBAL: OnceCell<Arc<ConversationMemory>> = OnceCell::const_new();

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Read limits and prompt budgets used by the façade.
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySettings {
    pub default_history_limit: usize,
    pub history_max_chars: usize,
    pub semantic_max_chars: usize,
    pub semantic_limit: usize,
    pub window_size: usize,
    pub window_max_chars: usize,
    /// Index on a detached task instead of inside `add_message`.
    pub background_indexing: bool,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self::from(&MemoryConfig::default())
    }
}

impl From<&MemoryConfig> for MemorySettings {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            default_history_limit: config.default_history_limit,
            history_max_chars: config.history_max_chars,
            semantic_max_chars: config.semantic_max_chars,
            semantic_limit: config.semantic_limit,
            window_size: config.window_size,
            window_max_chars: defaults::WINDOW_MAX_CHARS,
            background_indexing: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Assembles a [`ConversationMemory`] from explicit parts.
#[derive(Default)]
pub struct ConversationMemoryBuilder {
    store_config: StoreConfig,
    settings: MemorySettings,
    compactor: CompactorConfig,
    durable_backend: Option<SharedDurableBackend>,
    redis_url: Option<String>,
    summarizer: Option<SharedSummarizer>,
    index: Option<SemanticIndex>,
}

impl ConversationMemoryBuilder {
    pub fn store_config(mut self, config: StoreConfig) -> Self {
        self.store_config = config;
        self
    }

    pub fn settings(mut self, settings: MemorySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn compactor_config(mut self, config: CompactorConfig) -> Self {
        self.compactor = config;
        self
    }

    /// Probe this backend at build time instead of connecting to Redis.
    pub fn durable_backend(mut self, backend: SharedDurableBackend) -> Self {
        self.durable_backend = Some(backend);
        self
    }

    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    pub fn summarizer(mut self, summarizer: SharedSummarizer) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn semantic_index(mut self, index: SemanticIndex) -> Self {
        self.index = Some(index);
        self
    }

    /// Index inside `add_message` rather than on a spawned task.
    pub fn inline_indexing(mut self) -> Self {
        self.settings.background_indexing = false;
        self
    }

    /// Select the storage tier and assemble the service.
    pub async fn build(self) -> ConversationMemory {
        let store = match (self.durable_backend, self.redis_url) {
            (Some(backend), _) => HybridStore::with_backend(self.store_config, backend).await,
            (None, Some(url)) => HybridStore::connect(self.store_config, Some(&url)).await,
            (None, None) => HybridStore::connect(self.store_config, None).await,
        };
        let store = Arc::new(store);

        let mut compactor_config = self.compactor;
        compactor_config.history_limit = self.settings.default_history_limit;
        compactor_config.history_max_chars = self.settings.history_max_chars;

        let compactor = SummaryCompactor::new(store.clone(), self.summarizer, compactor_config);

        info!(
            storage = %store.storage_kind(),
            semantic = self.index.is_some(),
            summarizer = compactor.summarizer_name().unwrap_or("none"),
            "Conversation memory ready"
        );

        ConversationMemory {
            store,
            index: self.index.map(|index| Arc::new(GatedIndex::new(index))),
            compactor,
            settings: self.settings,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Index gate
// ─────────────────────────────────────────────────────────────────────────────

/// The semantic index plus a clear counter per session.
///
/// A write carries the generation its message was added under and is dropped
/// if the session was cleared since. Writes hold `gate` shared and a prune
/// holds it exclusively, so a spawned write cannot land after the prune.
#[derive(Debug)]
struct GatedIndex {
    inner: SemanticIndex,
    generations: Mutex<HashMap<String, u64>>,
    gate: RwLock<()>,
}

impl GatedIndex {
    fn new(inner: SemanticIndex) -> Self {
        Self {
            inner,
            generations: Mutex::new(HashMap::new()),
            gate: RwLock::new(()),
        }
    }

    fn generation(&self, session_id: &str) -> u64 {
        self.generations
            .lock()
            .get(session_id)
            .copied()
            .unwrap_or_default()
    }

    async fn index(&self, session_id: &str, message: &Message, generation: u64) {
        let _write = self.gate.read().await;
        if self.generation(session_id) != generation {
            debug!(session_id, "Session cleared before indexing, skipping");
            return;
        }
        self.inner.index(session_id, message).await;
    }

    async fn prune_session(&self, session_id: &str) -> usize {
        *self
            .generations
            .lock()
            .entry(session_id.to_string())
            .or_default() += 1;
        let _prune = self.gate.write().await;
        self.inner.prune_session(session_id).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ConversationMemory
// ─────────────────────────────────────────────────────────────────────────────

/// Session memory for a conversational assistant.
///
/// Every operation is infallible from the caller's side: storage, index and
/// summarizer failures are logged and turned into empty or partial results.
/// Share it as `Arc<ConversationMemory>`.
pub struct ConversationMemory {
    store: Arc<HybridStore>,
    index: Option<Arc<GatedIndex>>,
    compactor: SummaryCompactor,
    settings: MemorySettings,
}

impl std::fmt::Debug for ConversationMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationMemory")
            .field("storage_kind", &self.store.storage_kind())
            .field("index", &self.index)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ConversationMemory {
    pub fn builder() -> ConversationMemoryBuilder {
        ConversationMemoryBuilder::default()
    }

    /// Build from a loaded configuration, connecting to Redis if one is set.
    pub async fn from_config(config: &ColloqConfig) -> Self {
        let storage = config.storage();
        let memory = config.memory();
        let compaction = config.compaction();
        let semantic = config.semantic();

        let store_config = StoreConfig::new()
            .with_max_messages(memory.max_messages_per_session)
            .with_ttl(Duration::from_secs(memory.session_ttl_secs))
            .with_prefixes(storage.session_prefix, storage.summary_prefix)
            .with_probe_timeout(Duration::from_secs(storage.probe_timeout_secs))
            .with_operation_timeout(Duration::from_secs(storage.operation_timeout_secs));

        let mut settings = MemorySettings::from(&memory);
        settings.background_indexing = semantic.background;

        let mut builder = Self::builder()
            .store_config(store_config)
            .settings(settings)
            .compactor_config(compactor_config(&compaction));

        if let Some(url) = storage.redis_url {
            builder = builder.redis_url(url);
        }

        if compaction.enabled
            && let Some(summarizer) = build_summarizer(config.llm(), &compaction)
        {
            builder = builder.summarizer(summarizer);
        }

        if semantic.enabled {
            if let Some(embedder) = build_embedder(&config.embedding()) {
                builder = builder.semantic_index(SemanticIndex::new(
                    semantic.resolved_database(),
                    embedder,
                ));
            }
        } else {
            debug!("Semantic index disabled");
        }

        builder.build().await
    }

    /// The process-wide instance, built from discovered config on first use.
    pub async fn global() -> Arc<ConversationMemory> {
        GLOBAL
            .get_or_init(|| async {
                let config = match colloq_config::load_config(None) {
                    Ok(loaded) => {
                        for warning in &loaded.warnings {
                            warn!("{warning}");
                        }
                        loaded.config
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to load config, using defaults");
                        ColloqConfig::default()
                    }
                };
                Arc::new(Self::from_config(&config).await)
            })
            .await
            .clone()
    }

    /// Fresh opaque session id.
    pub fn new_session_id() -> SessionId {
        colloq_types::new_session_id()
    }

    pub fn storage_kind(&self) -> StorageKind {
        self.store.storage_kind()
    }

    pub fn settings(&self) -> &MemorySettings {
        &self.settings
    }

    // ── writes ────────────────────────────────────────────────────────────

    /// Append a turn to a session, creating the session if needed.
    ///
    /// The message is returned even if storing it failed.
    pub async fn add_message(
        &self,
        session_id: &str,
        role: Role,
        content: impl Into<String>,
        metadata: Option<Metadata>,
    ) -> Message {
        let mut message = Message::new(role, content);
        if let Some(metadata) = metadata {
            message = message.with_metadata(metadata);
        }

        if let Err(e) = self.store.append(session_id, message.clone()).await {
            warn!(session_id, error = %e, "Failed to store message");
        }

        // A trim at the cap leaves the count unchanged, so the count check
        // alone would keep serving a summary of dropped turns.
        self.compactor.invalidate(session_id).await;

        if let Some(index) = &self.index {
            let generation = index.generation(session_id);
            if self.settings.background_indexing {
                let index = index.clone();
                let sid = session_id.to_string();
                let indexed = message.clone();
                tokio::spawn(async move { index.index(&sid, &indexed, generation).await });
            } else {
                index.index(session_id, &message, generation).await;
            }
        }

        debug!(session_id, role = %role, "Added message");
        message
    }

    /// Remove a session from every tier, its summary and its index entries.
    ///
    /// True if the session held any messages.
    pub async fn clear_session(&self, session_id: &str) -> bool {
        let removed = match self.store.remove(session_id).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(session_id, error = %e, "Failed to clear session");
                false
            }
        };
        self.compactor.invalidate(session_id).await;
        if let Some(index) = &self.index {
            index.prune_session(session_id).await;
        }

        if removed {
            info!(session_id, "Cleared session");
        }
        removed
    }

    /// Remove every session. Returns how many were removed.
    pub async fn clear_all_sessions(&self) -> usize {
        match self.store.clear_all().await {
            Ok(count) => {
                info!(count, "Cleared all sessions");
                count
            }
            Err(e) => {
                warn!(error = %e, "Failed to clear sessions");
                0
            }
        }
    }

    /// Drop a cached summary.
    pub async fn invalidate_summary(&self, session_id: &str) -> bool {
        self.compactor.invalidate(session_id).await
    }

    // ── reads ─────────────────────────────────────────────────────────────

    async fn read(&self, session_id: &str, limit: usize) -> Vec<Message> {
        match self.store.read(session_id, limit).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(session_id, error = %e, "Failed to read history");
                Vec::new()
            }
        }
    }

    /// Most recent messages, oldest first.
    pub async fn get_recent_history(&self, session_id: &str, limit: Option<usize>) -> Vec<Message> {
        let limit = limit.unwrap_or(self.settings.default_history_limit);
        self.read(session_id, limit).await
    }

    /// Full stored history (up to 100 messages by default).
    pub async fn get_session_history(&self, session_id: &str, limit: Option<usize>) -> Vec<Message> {
        self.read(session_id, limit.unwrap_or(SESSION_HISTORY_LIMIT))
            .await
    }

    /// The last `window` user/assistant pairs, starting on a user turn.
    pub async fn get_window_history(&self, session_id: &str, window: Option<usize>) -> Vec<Message> {
        let window = window.unwrap_or(self.settings.window_size);
        let messages = self.read(session_id, window.saturating_mul(2)).await;
        format::skip_leading_assistant(messages)
    }

    /// Past turns of this session closest to `query_text`.
    pub async fn get_semantic_context(
        &self,
        session_id: &str,
        query_text: &str,
        limit: Option<usize>,
    ) -> Vec<SemanticMatch> {
        let Some(index) = &self.index else {
            return Vec::new();
        };
        let limit = limit.unwrap_or(self.settings.semantic_limit);
        let mut matches = index
            .inner
            .query(session_id, query_text, limit.saturating_mul(2))
            .await;
        matches.truncate(limit);
        matches
    }

    /// History for a prompt, summarized once it passes the threshold.
    pub async fn get_compacted_history(&self, session_id: &str, force_refresh: bool) -> String {
        self.compactor
            .get_compacted_history(session_id, force_refresh)
            .await
    }

    pub fn format_history_for_prompt(&self, messages: &[Message], max_chars: Option<usize>) -> String {
        format::format_history_for_prompt(
            messages,
            max_chars.unwrap_or(self.settings.history_max_chars),
        )
    }

    pub fn format_semantic_context(
        &self,
        entries: &[SemanticMatch],
        max_chars: Option<usize>,
    ) -> String {
        format::format_semantic_context(
            entries,
            max_chars.unwrap_or(self.settings.semantic_max_chars),
        )
    }

    pub fn format_window_history(&self, messages: &[Message], max_chars: Option<usize>) -> String {
        format::format_window_history(
            messages,
            max_chars.unwrap_or(self.settings.window_max_chars),
        )
    }

    // ── status ────────────────────────────────────────────────────────────

    pub async fn get_session_info(&self, session_id: &str) -> SessionInfo {
        let limit = self.store.config().max_messages_per_session;
        let messages = self.read(session_id, limit).await;

        let user_message_count = messages.iter().filter(|m| m.role == Role::User).count();
        SessionInfo {
            session_id: session_id.to_string(),
            exists: !messages.is_empty(),
            message_count: messages.len(),
            first_message_time: messages.first().map(|m| m.timestamp),
            last_message_time: messages.last().map(|m| m.timestamp),
            user_message_count,
            assistant_message_count: messages.len() - user_message_count,
            storage_kind: self.store.storage_kind(),
        }
    }

    pub async fn get_stats(&self) -> MemoryStats {
        let volatile = self.store.volatile();
        let semantic_entry_count = match &self.index {
            Some(index) => index.inner.count().await,
            None => 0,
        };

        MemoryStats {
            storage_kind: self.store.storage_kind(),
            durable_reachable: self.store.durable_reachable().await,
            durable_session_count: self.store.durable_session_count().await,
            volatile_session_count: volatile.session_count(),
            volatile_message_count: volatile.message_count(),
            semantic_enabled: self.index.is_some(),
            semantic_entry_count,
            summarizer: self.compactor.summarizer_name().map(str::to_string),
            max_messages_per_session: self.store.config().max_messages_per_session,
            session_ttl_secs: self.store.config().ttl_secs(),
            default_history_limit: self.settings.default_history_limit,
            summarize_threshold: self.compactor.config().summarize_threshold,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Collaborators from config
// ─────────────────────────────────────────────────────────────────────────────

fn compactor_config(compaction: &CompactionConfig) -> CompactorConfig {
    CompactorConfig {
        enabled: compaction.enabled,
        summarize_threshold: compaction.summarize_threshold,
        turn_char_cap: compaction.turn_char_cap,
        timeout: Duration::from_secs(compaction.timeout_secs),
        ..CompactorConfig::default()
    }
}

fn build_summarizer(llm: Option<LlmConfig>, compaction: &CompactionConfig) -> Option<SharedSummarizer> {
    let Some(llm) = llm else {
        info!("No [llm] section configured, summaries disabled");
        return None;
    };

    let base = match llm.resolve_api_key() {
        Some(key) => OpenAiConfig::openai(key),
        None if llm.base_url == defaults::LLM_BASE_URL => {
            warn!(
                env = %llm.api_key_env,
                "No API key for the summary model, summaries disabled"
            );
            return None;
        }
        None => OpenAiConfig::ollama(),
    };

    let openai = base
        .with_base_url(&llm.base_url)
        .with_model(&llm.model)
        .with_name("summary")
        .with_timeout(Duration::from_secs(llm.timeout_secs))
        .with_max_retries(llm.max_retries);

    let backend = match OpenAiBackend::new(openai) {
        Ok(backend) => backend,
        Err(e) => {
            warn!(error = %e, "Failed to create summary backend");
            return None;
        }
    };

    let summarizer = LlmSummarizer::new(
        Arc::new(backend),
        LlmSummarizerConfig {
            model: llm.model,
            max_tokens: compaction.max_tokens,
            temperature: compaction.temperature,
            prompt: compaction.prompt.clone(),
        },
    );
    Some(Arc::new(summarizer))
}

fn build_embedder(config: &EmbeddingConfig) -> Option<SharedEmbedder> {
    match config.provider {
        EmbeddingProvider::Mock => Some(Arc::new(MockEmbedder::new(config.effective_dimensions()))),
        EmbeddingProvider::OpenAi => {
            let Some(key) = std::env::var(&config.api_key_env)
                .ok()
                .filter(|k| !k.is_empty())
            else {
                warn!(env = %config.api_key_env, "No API key for embeddings, semantic index disabled");
                return None;
            };

            let mut openai = OpenAiEmbedderConfig::new(key);
            if let Some(url) = &config.base_url {
                openai = openai.with_base_url(url);
            }
            if let Some(model) = &config.model {
                openai = openai.with_model(model);
            }
            if let Some(dims) = config.dimensions {
                openai = openai.with_dimensions(dims);
            }

            match OpenAiEmbedder::new(openai) {
                Ok(embedder) => Some(Arc::new(embedder)),
                Err(e) => {
                    warn!(error = %e, "Failed to create embedder, semantic index disabled");
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compactor::Summarizer;
    use colloq_llm::{Embedder, MockBackend};
    use colloq_store::MockDurableBackend;
    use serial_test::serial;

    async fn volatile_memory() -> ConversationMemory {
        ConversationMemory::builder().build().await
    }

    async fn memory_with_summarizer(backend: Arc<MockBackend>) -> ConversationMemory {
        ConversationMemory::builder()
            .summarizer(Arc::new(LlmSummarizer::new(
                backend,
                LlmSummarizerConfig::default(),
            )))
            .build()
            .await
    }

    async fn memory_with_index() -> ConversationMemory {
        ConversationMemory::builder()
            .semantic_index(SemanticIndex::in_memory(Arc::new(MockEmbedder::default())))
            .inline_indexing()
            .build()
            .await
    }

    #[tokio::test]
    async fn test_history_in_append_order() {
        let memory = volatile_memory().await;
        let sid = ConversationMemory::new_session_id();

        memory.add_message(&sid, Role::User, "first", None).await;
        memory.add_message(&sid, Role::Assistant, "second", None).await;
        memory.add_message(&sid, Role::User, "third", None).await;

        let history = memory.get_recent_history(&sid, None).await;
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
        assert!(history.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[tokio::test]
    async fn test_default_history_limit() {
        let memory = volatile_memory().await;
        for i in 0..10 {
            memory.add_message("s", Role::User, format!("m{i}"), None).await;
        }
        let history = memory.get_recent_history("s", None).await;
        assert_eq!(history.len(), 6);
        assert_eq!(history[0].content, "m4");
        assert_eq!(memory.get_session_history("s", None).await.len(), 10);
    }

    #[tokio::test]
    async fn test_cap_five_keeps_last_five() {
        let memory = ConversationMemory::builder()
            .store_config(StoreConfig::new().with_max_messages(5))
            .build()
            .await;
        for i in 0..10 {
            memory.add_message("s", Role::User, format!("m{i}"), None).await;
        }

        let history = memory.get_recent_history("s", Some(50)).await;
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m5", "m6", "m7", "m8", "m9"]);
    }

    #[tokio::test]
    async fn test_clear_session() {
        let memory = volatile_memory().await;
        memory.add_message("s", Role::User, "hello", None).await;

        assert!(memory.clear_session("s").await);
        assert!(memory.get_recent_history("s", None).await.is_empty());
        assert!(!memory.clear_session("s").await);
        assert!(!memory.clear_session("never-seen").await);
    }

    #[tokio::test]
    async fn test_session_isolation() {
        let memory = volatile_memory().await;
        memory.add_message("a", Role::User, "for a", None).await;
        memory.add_message("b", Role::User, "for b", None).await;

        let a = memory.get_recent_history("a", None).await;
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].content, "for a");

        memory.clear_session("a").await;
        assert_eq!(memory.get_recent_history("b", None).await.len(), 1);
    }

    #[tokio::test]
    async fn test_metadata_is_kept() {
        let memory = volatile_memory().await;
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), serde_json::json!("telegram"));

        let returned = memory
            .add_message("s", Role::User, "hi", Some(metadata.clone()))
            .await;
        assert_eq!(returned.metadata, metadata);
        assert_eq!(memory.get_recent_history("s", None).await[0].metadata, metadata);
    }

    #[tokio::test]
    async fn test_compaction_counts_summarizer_calls() {
        let backend = Arc::new(MockBackend::new(vec![
            "User discussing Suricata alerts.".into(),
            "User discussing Suricata and Zeek.".into(),
        ]));
        let memory = memory_with_summarizer(backend.clone()).await;

        for i in 0..5 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            memory.add_message("s", role, format!("turn {i}"), None).await;
        }

        let first = memory.get_compacted_history("s", false).await;
        assert_eq!(backend.request_count(), 1);
        assert_eq!(memory.get_compacted_history("s", false).await, first);
        assert_eq!(backend.request_count(), 1);

        memory.add_message("s", Role::Assistant, "turn 5", None).await;
        let second = memory.get_compacted_history("s", false).await;
        assert_eq!(backend.request_count(), 2);
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_summary_refreshes_after_trim_at_cap() {
        let backend = Arc::new(MockBackend::new(vec!["User discussing the router.".into()]));
        let memory = ConversationMemory::builder()
            .store_config(StoreConfig::new().with_max_messages(5))
            .summarizer(Arc::new(LlmSummarizer::new(
                backend.clone(),
                LlmSummarizerConfig::default(),
            )))
            .build()
            .await;

        for i in 0..5 {
            memory.add_message("s", Role::User, format!("turn {i}"), None).await;
        }
        memory.get_compacted_history("s", false).await;

        // Still five messages after this append.
        memory.add_message("s", Role::User, "turn 5", None).await;
        memory.get_compacted_history("s", false).await;
        assert_eq!(backend.request_count(), 2);
    }

    #[tokio::test]
    async fn test_session_info() {
        let memory = volatile_memory().await;
        for i in 0..3 {
            memory.add_message("s", Role::User, format!("q{i}"), None).await;
        }
        for i in 0..2 {
            memory.add_message("s", Role::Assistant, format!("a{i}"), None).await;
        }

        let info = memory.get_session_info("s").await;
        assert!(info.exists);
        assert_eq!(info.message_count, 5);
        assert_eq!(info.user_message_count, 3);
        assert_eq!(info.assistant_message_count, 2);
        assert_eq!(info.storage_kind, StorageKind::Volatile);
        assert!(info.first_message_time < info.last_message_time);

        let missing = memory.get_session_info("missing").await;
        assert!(!missing.exists);
        assert_eq!(missing.message_count, 0);
        assert!(missing.first_message_time.is_none());
    }

    #[tokio::test]
    async fn test_stats_in_volatile_mode() {
        let memory = volatile_memory().await;
        memory.add_message("a", Role::User, "1", None).await;
        memory.add_message("a", Role::Assistant, "2", None).await;
        memory.add_message("b", Role::User, "3", None).await;

        let stats = memory.get_stats().await;
        assert_eq!(stats.storage_kind, StorageKind::Volatile);
        assert!(!stats.durable_reachable);
        assert_eq!(stats.durable_session_count, None);
        assert_eq!(stats.volatile_session_count, 2);
        assert_eq!(stats.volatile_message_count, 3);
        assert_eq!(stats.max_messages_per_session, 20);
        assert_eq!(stats.session_ttl_secs, 3600);
        assert_eq!(stats.default_history_limit, 6);
        assert_eq!(stats.summarize_threshold, 4);
        assert!(!stats.semantic_enabled);
    }

    #[tokio::test]
    async fn test_unreachable_durable_behaves_volatile() {
        let backend = Arc::new(MockDurableBackend::unreachable());
        let memory = ConversationMemory::builder()
            .durable_backend(backend.clone())
            .build()
            .await;
        assert_eq!(memory.storage_kind(), StorageKind::Volatile);

        memory.add_message("s", Role::User, "still works", None).await;
        assert_eq!(memory.get_recent_history("s", None).await.len(), 1);
        assert!(memory.clear_session("s").await);
        assert!(memory.get_recent_history("s", None).await.is_empty());
    }

    #[tokio::test]
    async fn test_durable_mode_uses_backend() {
        let backend = Arc::new(MockDurableBackend::new());
        let memory = ConversationMemory::builder()
            .durable_backend(backend.clone())
            .build()
            .await;
        assert_eq!(memory.storage_kind(), StorageKind::Durable);

        memory.add_message("s", Role::User, "persisted", None).await;
        assert!(backend.raw("conv:s").is_some());

        let stats = memory.get_stats().await;
        assert!(stats.durable_reachable);
        assert_eq!(stats.durable_session_count, Some(1));
        assert_eq!(stats.volatile_session_count, 0);

        assert_eq!(memory.clear_all_sessions().await, 1);
        assert!(backend.raw("conv:s").is_none());
    }

    #[tokio::test]
    async fn test_transient_durable_failure_falls_back() {
        let backend = Arc::new(MockDurableBackend::new());
        let memory = ConversationMemory::builder()
            .durable_backend(backend.clone())
            .build()
            .await;

        backend.fail_next(1);
        memory.add_message("s", Role::User, "kept locally", None).await;

        assert!(backend.raw("conv:s").is_none());
        assert_eq!(memory.get_stats().await.volatile_message_count, 1);
    }

    #[tokio::test]
    async fn test_window_history() {
        let memory = volatile_memory().await;
        memory.add_message("s", Role::User, "q0", None).await;
        memory.add_message("s", Role::Assistant, "a0", None).await;
        memory.add_message("s", Role::User, "q1", None).await;
        memory.add_message("s", Role::Assistant, "a1", None).await;
        memory.add_message("s", Role::User, "q2", None).await;

        // Last four are a0 q1 a1 q2; the leading assistant turn is skipped.
        let window = memory.get_window_history("s", Some(2)).await;
        let contents: Vec<_> = window.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "a1", "q2"]);

        assert_eq!(
            memory.format_window_history(&window, None),
            "Previous conversation:\nUser: q1\nAssistant: a1\nUser: q2"
        );
    }

    #[tokio::test]
    async fn test_formatting_defaults() {
        let memory = volatile_memory().await;
        assert_eq!(memory.format_history_for_prompt(&[], None), "");
        let long = vec![Message::user("x".repeat(3000))];
        let out = memory.format_history_for_prompt(&long, None);
        assert_eq!(out.lines().nth(1).unwrap().chars().count(), 1950 + 3);
    }

    #[tokio::test]
    #[serial]
    async fn test_semantic_context() {
        let memory = memory_with_index().await;
        memory
            .add_message("s", Role::User, "the pfsense firewall blocks 10.0.0.7", None)
            .await;
        memory
            .add_message("s", Role::Assistant, "restart the zeek sensor", None)
            .await;
        memory
            .add_message("s", Role::User, "what time is lunch", None)
            .await;
        memory
            .add_message("other", Role::User, "pfsense firewall in another session", None)
            .await;

        let matches = memory.get_semantic_context("s", "pfsense firewall", Some(1)).await;
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].content, "the pfsense firewall blocks 10.0.0.7");
        assert_eq!(matches[0].role, Role::User);

        let all = memory.get_semantic_context("s", "pfsense firewall", None).await;
        assert_eq!(all.len(), 3);

        let rendered = memory.format_semantic_context(&matches, None);
        assert_eq!(
            rendered,
            "Related past conversation:\nUser: the pfsense firewall blocks 10.0.0.7"
        );

        assert_eq!(memory.get_stats().await.semantic_entry_count, 4);
    }

    #[tokio::test]
    #[serial]
    async fn test_clear_session_prunes_index() {
        let memory = memory_with_index().await;
        memory.add_message("s", Role::User, "forget me", None).await;
        memory.add_message("t", Role::User, "keep me", None).await;

        assert!(memory.clear_session("s").await);
        assert!(memory.get_semantic_context("s", "forget me", None).await.is_empty());
        assert_eq!(memory.get_stats().await.semantic_entry_count, 1);
    }

    async fn memory_with_background_index() -> ConversationMemory {
        ConversationMemory::builder()
            .semantic_index(SemanticIndex::in_memory(Arc::new(MockEmbedder::default())))
            .build()
            .await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[serial]
    async fn test_background_indexing_is_eventually_visible() {
        let memory = memory_with_background_index().await;
        assert!(memory.settings().background_indexing);
        memory
            .add_message("s", Role::User, "suricata alert on the dmz switch", None)
            .await;

        let mut matches = Vec::new();
        for _ in 0..200 {
            matches = memory.get_semantic_context("s", "suricata alert", None).await;
            if !matches.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].content, "suricata alert on the dmz switch");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[serial]
    async fn test_clear_wins_over_pending_background_index() {
        let memory = memory_with_background_index().await;
        for i in 0..20 {
            memory
                .add_message("s", Role::User, format!("gateway reboot number {i}"), None)
                .await;
        }
        assert!(memory.clear_session("s").await);

        // Let every spawned write finish; none may land after the prune.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(memory.get_semantic_context("s", "gateway reboot", None).await.is_empty());
        assert_eq!(memory.get_stats().await.semantic_entry_count, 0);

        memory
            .add_message("s", Role::User, "gateway reboot after clear", None)
            .await;
        let mut matches = Vec::new();
        for _ in 0..200 {
            matches = memory.get_semantic_context("s", "gateway reboot", None).await;
            if !matches.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].content, "gateway reboot after clear");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_volatile_keep_all() {
        let memory = Arc::new(
            ConversationMemory::builder()
                .store_config(StoreConfig::default().with_max_messages(100))
                .build()
                .await,
        );

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let memory = memory.clone();
                tokio::spawn(async move {
                    memory
                        .add_message("s", Role::User, format!("turn {i}"), None)
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let history = memory.get_session_history("s", Some(100)).await;
        assert_eq!(history.len(), 50);
        let mut contents: Vec<_> = history.iter().map(|m| m.content.clone()).collect();
        contents.sort();
        contents.dedup();
        assert_eq!(contents.len(), 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_durable_may_lose_writes() {
        let backend = Arc::new(MockDurableBackend::new());
        let memory = Arc::new(
            ConversationMemory::builder()
                .store_config(StoreConfig::default().with_max_messages(100))
                .durable_backend(backend.clone())
                .build()
                .await,
        );
        assert_eq!(memory.storage_kind(), StorageKind::Durable);

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let memory = memory.clone();
                tokio::spawn(async move {
                    memory
                        .add_message("s", Role::User, format!("turn {i}"), None)
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        // Durable appends are read-modify-write with no lock, so racing
        // writers can overwrite each other. Nothing is duplicated and the
        // session is never emptied.
        let history = memory.get_session_history("s", Some(100)).await;
        assert!(!history.is_empty());
        assert!(history.len() <= 50);
        let mut contents: Vec<_> = history.iter().map(|m| m.content.clone()).collect();
        contents.sort();
        contents.dedup();
        assert_eq!(contents.len(), history.len());
    }

    #[tokio::test]
    async fn test_semantic_without_index_is_empty() {
        let memory = volatile_memory().await;
        memory.add_message("s", Role::User, "anything", None).await;
        assert!(memory.get_semantic_context("s", "anything", None).await.is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn test_from_config_volatile_without_llm() {
        let dir = tempfile::tempdir().unwrap();
        let config = ColloqConfig::from_toml(&format!(
            r#"
            [memory]
            max_messages_per_session = 8
            default_history_limit = 4

            [compaction]
            summarize_threshold = 3

            [semantic]
            database = "{}"
            background = false
            "#,
            dir.path().join("semantic.db").display()
        ))
        .unwrap();

        let memory = ConversationMemory::from_config(&config).await;
        assert_eq!(memory.storage_kind(), StorageKind::Volatile);
        assert!(!memory.settings().background_indexing);

        memory.add_message("s", Role::User, "indexed on disk", None).await;
        let stats = memory.get_stats().await;
        assert_eq!(stats.max_messages_per_session, 8);
        assert_eq!(stats.default_history_limit, 4);
        assert_eq!(stats.summarize_threshold, 3);
        assert!(stats.summarizer.is_none());
        assert!(stats.semantic_enabled);
        assert_eq!(stats.semantic_entry_count, 1);
    }

    #[test]
    fn test_openai_embedder_needs_key() {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::OpenAi,
            api_key_env: "COLLOQ_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            ..Default::default()
        };
        assert!(build_embedder(&config).is_none());
        assert_eq!(
            build_embedder(&EmbeddingConfig::default()).map(|e| e.dimensions()),
            Some(384)
        );
    }

    #[test]
    fn test_summarizer_from_config() {
        let compaction = CompactionConfig::default();
        assert!(build_summarizer(None, &compaction).is_none());

        let keyed = LlmConfig {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        let summarizer = build_summarizer(Some(keyed), &compaction).unwrap();
        assert_eq!(summarizer.name(), "summary");

        let local = LlmConfig {
            base_url: "http://localhost:11434/v1".to_string(),
            api_key_env: "COLLOQ_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            ..Default::default()
        };
        assert!(build_summarizer(Some(local), &compaction).is_some());
    }
}
