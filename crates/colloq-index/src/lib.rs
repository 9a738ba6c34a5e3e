//! Semantic recall for Colloq.
//!
//! Message text is embedded through a [`colloq_llm::Embedder`] and stored in
//! SQLite with the sqlite-vec extension. Each entry is keyed by
//! `{session_id}-{timestamp}` and searched only within its own session.
//!
//! The index is best-effort: [`SemanticIndex::index`] and
//! [`SemanticIndex::query`] never fail, they log and degrade to no-ops.

pub mod error;
pub mod index;
pub mod vector;

pub use error::{IndexError, Result};
pub use index::{IndexLocation, SemanticIndex, document_id};
