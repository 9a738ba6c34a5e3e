//! Conversation entry storage and similarity search using sqlite-vec.
//!
//! Entries live in two tables joined by `entry_id`: a plain table holding the
//! text with its session, role and timestamp, and a `vec0` virtual table
//! holding the embedding. Searches are scoped to one session and ranked by
//! L2 distance.

use colloq_types::{Role, SemanticMatch};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};
use zerocopy::IntoBytes;

use crate::error::{IndexError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Extension
// ─────────────────────────────────────────────────────────────────────────────

/// Register sqlite-vec for every connection opened afterwards.
///
/// `sqlite3_auto_extension` applies process-wide and ignores duplicate
/// registrations.
pub fn init_vector_extension() {
    use rusqlite::ffi::sqlite3_auto_extension;
    use sqlite_vec::sqlite3_vec_init;

    unsafe {
        #[allow(clippy::missing_transmute_annotations)]
        sqlite3_auto_extension(Some(std::mem::transmute(sqlite3_vec_init as *const ())));
    }
}

/// Version string reported by the loaded extension.
pub fn check_vector_extension(conn: &Connection) -> Result<String> {
    let version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
    Ok(version)
}

// ─────────────────────────────────────────────────────────────────────────────
// Schema
// ─────────────────────────────────────────────────────────────────────────────

/// Create the index tables for `dims`-sized embeddings.
///
/// When an existing database was built with a different dimensionality its
/// contents are dropped and the tables recreated. Returns `true` in that case.
pub fn ensure_schema(conn: &Connection, dims: usize) -> Result<bool> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;

    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM index_meta WHERE key = 'dimensions'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    let mut reset = false;
    if let Some(stored) = stored
        && stored != dims.to_string()
    {
        warn!(
            stored = %stored,
            dims,
            "Embedding dimensions changed, rebuilding semantic index"
        );
        drop_tables(conn)?;
        reset = true;
    }

    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS conversation_entries (
            entry_id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            timestamp REAL NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_entries_session
            ON conversation_entries(session_id);
        CREATE VIRTUAL TABLE IF NOT EXISTS conversation_embeddings USING vec0(
            entry_id TEXT PRIMARY KEY,
            embedding float[{dims}]
        );
        "#
    );
    conn.execute_batch(&sql)?;

    conn.execute(
        "INSERT OR REPLACE INTO index_meta (key, value) VALUES ('dimensions', ?1)",
        params![dims.to_string()],
    )?;

    debug!(dims, "Semantic index schema ready");
    Ok(reset)
}

/// Drop both index tables.
pub fn drop_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS conversation_embeddings;
        DROP TABLE IF EXISTS conversation_entries;
        "#,
    )?;
    info!("Dropped semantic index tables");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Entries
// ─────────────────────────────────────────────────────────────────────────────

/// A row to be written into the index.
#[derive(Debug, Clone)]
pub struct EntryRecord<'a> {
    pub entry_id: &'a str,
    pub session_id: &'a str,
    pub role: Role,
    pub content: &'a str,
    pub timestamp: f64,
}

/// Insert an entry and its embedding.
///
/// Entries are write-once: if `entry_id` already exists nothing is written
/// and `false` is returned.
pub fn insert_entry(conn: &mut Connection, entry: &EntryRecord<'_>, embedding: &[f32]) -> Result<bool> {
    let tx = conn.transaction()?;

    let inserted = tx.execute(
        r#"
        INSERT OR IGNORE INTO conversation_entries (entry_id, session_id, role, content, timestamp)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            entry.entry_id,
            entry.session_id,
            entry.role.as_str(),
            entry.content,
            entry.timestamp
        ],
    )?;

    if inserted == 0 {
        debug!(entry_id = entry.entry_id, "Entry already indexed");
        return Ok(false);
    }

    tx.execute(
        "INSERT INTO conversation_embeddings (entry_id, embedding) VALUES (?1, ?2)",
        params![entry.entry_id, embedding.as_bytes()],
    )?;
    tx.commit()?;

    Ok(true)
}

/// Nearest entries within one session, closest first.
pub fn search_session(
    conn: &Connection,
    session_id: &str,
    query_embedding: &[f32],
    limit: usize,
) -> Result<Vec<SemanticMatch>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT e.content, e.role, e.timestamp,
               vec_distance_l2(v.embedding, ?1) AS distance
        FROM conversation_entries e
        JOIN conversation_embeddings v ON v.entry_id = e.entry_id
        WHERE e.session_id = ?2
        ORDER BY distance ASC, e.timestamp DESC
        LIMIT ?3
        "#,
    )?;

    let mut rows = stmt.query(params![
        query_embedding.as_bytes(),
        session_id,
        limit as i64
    ])?;

    let mut results = Vec::new();
    while let Some(row) = rows.next()? {
        let role_str: String = row.get(1)?;
        let role = role_str
            .parse::<Role>()
            .map_err(IndexError::InvalidData)?;
        results.push(SemanticMatch {
            content: row.get(0)?,
            role,
            timestamp: row.get(2)?,
            distance: row.get(3)?,
        });
    }

    debug!(
        session_id,
        found = results.len(),
        limit,
        "Semantic search complete"
    );
    Ok(results)
}

/// Total number of indexed entries.
pub fn count_entries(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM conversation_entries", [], |row| {
        row.get(0)
    })?;
    Ok(count as usize)
}

/// Number of indexed entries for one session.
pub fn count_session_entries(conn: &Connection, session_id: &str) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM conversation_entries WHERE session_id = ?1",
        params![session_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

/// Remove every entry belonging to a session. Returns how many were removed.
pub fn delete_session(conn: &mut Connection, session_id: &str) -> Result<usize> {
    let tx = conn.transaction()?;

    let ids: Vec<String> = {
        let mut stmt = tx.prepare("SELECT entry_id FROM conversation_entries WHERE session_id = ?1")?;
        let rows = stmt.query_map(params![session_id], |row| row.get(0))?;
        rows.collect::<std::result::Result<_, _>>()?
    };

    for id in &ids {
        tx.execute(
            "DELETE FROM conversation_embeddings WHERE entry_id = ?1",
            params![id],
        )?;
    }
    tx.execute(
        "DELETE FROM conversation_entries WHERE session_id = ?1",
        params![session_id],
    )?;
    tx.commit()?;

    Ok(ids.len())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
