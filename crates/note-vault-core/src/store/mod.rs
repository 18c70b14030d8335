//! Storage abstraction for Note Vault.
//!
//! The [`Store`] trait is everything the search coordinator needs from a
//! backend: document persistence, a ranked relevance index with an atomic
//! self-heal path, a substring fallback and a recency listing. Backends are
//! the SQLite store in the application crate and [`memory::InMemoryStore`].
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::{Document, Mechanism, NoteStatus, QueryResult, Rank, UpsertOutcome};

/// Failures a backend can report to the coordinator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store is missing or cannot be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The relevance index rejected the query expression.
    #[error("malformed relevance query: {0}")]
    MalformedQuery(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Offset/limit pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub offset: usize,
    pub limit: usize,
}

impl Window {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// Rows a consistent backend must return for `total` matches.
    pub fn expected_rows(&self, total: usize) -> usize {
        self.limit.min(total.saturating_sub(self.offset))
    }
}

/// A result row as produced by a backend, before a mechanism is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub document_id: String,
    pub year: Option<i32>,
    pub filename: String,
    pub source_path: Option<String>,
    pub excerpt: String,
    pub status: NoteStatus,
    pub status_note: Option<String>,
    pub updated_at: i64,
    /// Relevance score when produced by the relevance index (lower is better).
    pub score: Option<f64>,
}

impl Hit {
    pub fn from_document(doc: &Document, score: Option<f64>) -> Self {
        Self {
            document_id: doc.id.clone(),
            year: doc.year,
            filename: doc.filename.clone(),
            source_path: doc.source_path.clone(),
            excerpt: doc.excerpt.clone(),
            status: doc.status,
            status_note: doc.status_note.clone(),
            updated_at: doc.updated_at,
            score,
        }
    }

    pub fn into_result(self, mechanism: Mechanism) -> QueryResult {
        let rank = match self.score {
            Some(score) => Rank::Score(score),
            None => Rank::Recency(self.updated_at),
        };
        QueryResult {
            document_id: self.document_id,
            year: self.year,
            filename: self.filename,
            source_path: self.source_path,
            excerpt: self.excerpt,
            status: self.status,
            status_note: self.status_note,
            updated_at: self.updated_at,
            rank,
            mechanism,
        }
    }
}

/// One page of hits plus the total the same mechanism reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HitPage {
    pub hits: Vec<Hit>,
    /// Matches that resolve to a stored document.
    pub total: usize,
    /// Matching index entries with no document behind them. Always zero for
    /// substring and recency pages.
    pub orphaned: usize,
}

impl HitPage {
    pub fn new(hits: Vec<Hit>, total: usize) -> Self {
        Self {
            hits,
            total,
            orphaned: 0,
        }
    }
}

/// Result of [`Store::heal_and_retry`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealedPage {
    pub page: HitPage,
    pub orphans_removed: usize,
}

/// An AND-of-prefixes query against the relevance index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelevanceQuery {
    pub tokens: Vec<String>,
    pub year: Option<i32>,
}

impl RelevanceQuery {
    pub fn new(tokens: Vec<String>, year: Option<i32>) -> Self {
        Self { tokens, year }
    }

    /// FTS5 match expression: every token quoted and prefix-matched.
    ///
    /// Returns `None` when no token survives quoting.
    pub fn match_expression(&self) -> Option<String> {
        let parts: Vec<String> = self
            .tokens
            .iter()
            .map(|t| t.replace('"', ""))
            .filter(|t| !t.is_empty())
            .map(|t| format!("\"{}\"*", t))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" AND "))
        }
    }
}

/// Abstract storage backend for Note Vault.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_document`](Store::upsert_document) | Insert or replace a document and its index entry |
/// | [`get_document`](Store::get_document) | Fetch one document |
/// | [`delete_document`](Store::delete_document) | Remove a document and its index entry |
/// | [`has_relevance_index`](Store::has_relevance_index) | Whether the ranked index exists |
/// | [`relevance_page`](Store::relevance_page) | Ranked page + index-side total |
/// | [`heal_and_retry`](Store::heal_and_retry) | Atomically drop orphans and re-run the ranked query |
/// | [`substring_page`](Store::substring_page) | Substring conjunction over stored excerpts |
/// | [`all_page`](Store::all_page) | Every document by recency |
#[async_trait]
pub trait Store: Send + Sync {
    /// Idempotent upsert keyed by `doc.id`. Keeps the existing `created_at`.
    async fn upsert_document(&self, doc: &Document) -> StoreResult<UpsertOutcome>;

    async fn get_document(&self, id: &str) -> StoreResult<Option<Document>>;

    /// Returns `false` when no such document existed.
    async fn delete_document(&self, id: &str) -> StoreResult<bool>;

    async fn has_relevance_index(&self) -> StoreResult<bool>;

    /// Ranked page ordered by score ascending, then id. `total` counts
    /// matches joined to a document; `orphaned` counts matching index
    /// entries whose document is gone.
    async fn relevance_page(&self, query: &RelevanceQuery, window: Window) -> StoreResult<HitPage>;

    /// Deletes index entries without a document and re-runs
    /// [`relevance_page`](Store::relevance_page), as one atomic unit.
    async fn heal_and_retry(&self, query: &RelevanceQuery, window: Window)
        -> StoreResult<HealedPage>;

    /// Documents whose excerpt contains every token (case-insensitive),
    /// newest first.
    async fn substring_page(
        &self,
        tokens: &[String],
        year: Option<i32>,
        window: Window,
    ) -> StoreResult<HitPage>;

    /// Every document, optionally for one year, newest first.
    async fn all_page(&self, year: Option<i32>, window: Window) -> StoreResult<HitPage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_expression() {
        let q = RelevanceQuery::new(vec!["aposentadoria".into(), "ru\"ral".into()], None);
        assert_eq!(
            q.match_expression().as_deref(),
            Some("\"aposentadoria\"* AND \"rural\"*")
        );
        let empty = RelevanceQuery::new(vec!["\"\"".into()], None);
        assert_eq!(empty.match_expression(), None);
    }

    #[test]
    fn test_expected_rows() {
        let w = Window::new(20, 20);
        assert_eq!(w.expected_rows(35), 15);
        assert_eq!(w.expected_rows(10), 0);
        assert_eq!(Window::new(0, 20).expected_rows(35), 20);
    }

    #[test]
    fn test_hit_rank() {
        let hit = Hit {
            document_id: "a".into(),
            year: Some(2024),
            filename: "a.pdf".into(),
            source_path: None,
            excerpt: String::new(),
            status: NoteStatus::InForce,
            status_note: None,
            updated_at: 10,
            score: None,
        };
        let row = hit.clone().into_result(Mechanism::AllDocuments);
        assert_eq!(row.rank, Rank::Recency(10));
        let row = Hit {
            score: Some(-2.0),
            ..hit
        }
        .into_result(Mechanism::PrimaryIndex);
        assert_eq!(row.rank, Rank::Score(-2.0));
    }
}
