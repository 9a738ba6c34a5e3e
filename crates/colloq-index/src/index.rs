//! Lazily opened, best-effort semantic index.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use colloq_llm::SharedEmbedder;
use colloq_types::{Message, SemanticMatch};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{IndexError, Result};
use crate::vector::{self, EntryRecord};

type Handle = Arc<Mutex<Connection>>;

/// Where the index database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexLocation {
    /// A file on disk; parent directories are created on first use.
    File(PathBuf),
    /// A private in-memory database.
    Memory,
}

/// Per-session vector index of message text.
///
/// The database is opened on first use, never at construction. If opening
/// fails the index stays unavailable for the life of the value: writes are
/// dropped and queries return nothing.
pub struct SemanticIndex {
    location: IndexLocation,
    embedder: SharedEmbedder,
    handle: OnceCell<Option<Handle>>,
}

impl std::fmt::Debug for SemanticIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticIndex")
            .field("location", &self.location)
            .field("embedder", &self.embedder.name())
            .field("initialized", &self.handle.initialized())
            .finish()
    }
}

/// Build the document id for a message.
pub fn document_id(session_id: &str, timestamp: f64) -> String {
    format!("{session_id}-{timestamp}")
}

impl SemanticIndex {
    /// Create an index backed by the database at `path`.
    pub fn new(path: impl Into<PathBuf>, embedder: SharedEmbedder) -> Self {
        Self {
            location: IndexLocation::File(path.into()),
            embedder,
            handle: OnceCell::new(),
        }
    }

    /// Create an index backed by an in-memory database.
    pub fn in_memory(embedder: SharedEmbedder) -> Self {
        Self {
            location: IndexLocation::Memory,
            embedder,
            handle: OnceCell::new(),
        }
    }

    pub fn location(&self) -> &IndexLocation {
        &self.location
    }

    /// Whether the lazy open has been attempted.
    pub fn is_initialized(&self) -> bool {
        self.handle.initialized()
    }

    /// Whether the index opened successfully. Triggers the lazy open.
    pub async fn is_available(&self) -> bool {
        self.handle().await.is_some()
    }

    async fn handle(&self) -> Option<Handle> {
        self.handle
            .get_or_init(|| async {
                let location = self.location.clone();
                let dims = self.embedder.dimensions();
                let opened = tokio::task::spawn_blocking(move || open(&location, dims)).await;

                match opened {
                    Ok(Ok(conn)) => {
                        info!(embedder = self.embedder.name(), dims, "Semantic index opened");
                        Some(Arc::new(Mutex::new(conn)))
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "Semantic index unavailable");
                        None
                    }
                    Err(e) => {
                        warn!(error = %e, "Semantic index open task failed");
                        None
                    }
                }
            })
            .await
            .clone()
    }

    async fn require_handle(&self) -> Result<Handle> {
        self.handle()
            .await
            .ok_or_else(|| IndexError::Unavailable("index failed to open".to_string()))
    }

    /// Index a message. Failures are logged and swallowed.
    pub async fn index(&self, session_id: &str, message: &Message) {
        match self.try_index(session_id, message).await {
            Ok(true) => debug!(session_id, "Message indexed"),
            Ok(false) => debug!(session_id, "Message already indexed"),
            Err(IndexError::Unavailable(_)) => {
                debug!(session_id, "Semantic index unavailable, skipping")
            }
            Err(e) => warn!(session_id, error = %e, "Failed to index message"),
        }
    }

    /// Index a message, reporting failures.
    ///
    /// Returns `false` when an entry with the same document id already exists.
    pub async fn try_index(&self, session_id: &str, message: &Message) -> Result<bool> {
        let handle = self.require_handle().await?;
        let embedding = self.embedder.embed(&message.content).await?;

        let entry_id = document_id(session_id, message.timestamp);
        let session_id = session_id.to_string();
        let content = message.content.clone();
        let role = message.role;
        let timestamp = message.timestamp;

        tokio::task::spawn_blocking(move || {
            let mut conn = handle.lock();
            vector::insert_entry(
                &mut conn,
                &EntryRecord {
                    entry_id: &entry_id,
                    session_id: &session_id,
                    role,
                    content: &content,
                    timestamp,
                },
                &embedding,
            )
        })
        .await?
    }

    /// Nearest entries for `query_text` within a session. Empty on any failure.
    pub async fn query(&self, session_id: &str, query_text: &str, limit: usize) -> Vec<SemanticMatch> {
        match self.try_query(session_id, query_text, limit).await {
            Ok(matches) => matches,
            Err(IndexError::Unavailable(_)) => {
                debug!(session_id, "Semantic index unavailable, no context");
                Vec::new()
            }
            Err(e) => {
                warn!(session_id, error = %e, "Semantic query failed");
                Vec::new()
            }
        }
    }

    /// Nearest entries for `query_text` within a session, reporting failures.
    pub async fn try_query(
        &self,
        session_id: &str,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<SemanticMatch>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let handle = self.require_handle().await?;
        let embedding = self.embedder.embed(query_text).await?;
        let session_id = session_id.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = handle.lock();
            vector::search_session(&conn, &session_id, &embedding, limit)
        })
        .await?
    }

    /// Total indexed entries, or 0 when unavailable.
    pub async fn count(&self) -> usize {
        let Some(handle) = self.handle().await else {
            return 0;
        };
        let counted = tokio::task::spawn_blocking(move || {
            let conn = handle.lock();
            vector::count_entries(&conn)
        })
        .await;

        match counted {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to count semantic entries");
                0
            }
            Err(e) => {
                warn!(error = %e, "Semantic count task failed");
                0
            }
        }
    }

    /// Remove a session's entries. Returns how many were removed.
    pub async fn prune_session(&self, session_id: &str) -> usize {
        let Some(handle) = self.handle().await else {
            return 0;
        };
        let sid = session_id.to_string();
        let pruned = tokio::task::spawn_blocking(move || {
            let mut conn = handle.lock();
            vector::delete_session(&mut conn, &sid)
        })
        .await;

        match pruned {
            Ok(Ok(n)) => {
                debug!(session_id, removed = n, "Pruned semantic entries");
                n
            }
            Ok(Err(e)) => {
                warn!(session_id, error = %e, "Failed to prune semantic entries");
                0
            }
            Err(e) => {
                warn!(session_id, error = %e, "Semantic prune task failed");
                0
            }
        }
    }
}

fn open(location: &IndexLocation, dims: usize) -> Result<Connection> {
    vector::init_vector_extension();

    let conn = match location {
        IndexLocation::Memory => Connection::open_in_memory()?,
        IndexLocation::File(path) => open_file(path)?,
    };

    vector::check_vector_extension(&conn)?;
    vector::ensure_schema(&conn, dims)?;
    Ok(conn)
}

fn open_file(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            IndexError::Unavailable(format!("cannot create {}: {e}", parent.display()))
        })?;
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
    )?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}
