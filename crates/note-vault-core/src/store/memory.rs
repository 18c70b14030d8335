//! In-memory [`Store`] implementation for tests and embedding.
//!
//! Documents and index entries live in separate maps behind one
//! `std::sync::RwLock`, so the index can diverge from the documents exactly
//! like a real full-text table can. Relevance scoring is a small
//! prefix-match term-frequency score, negated so that lower is better.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::anyhow;
use async_trait::async_trait;

use crate::models::{Document, UpsertOutcome};
use crate::normalize::normalize_term;

use super::{HealedPage, Hit, HitPage, RelevanceQuery, Store, StoreError, StoreResult, Window};

struct IndexEntry {
    year: Option<i32>,
    words: Vec<String>,
}

impl IndexEntry {
    fn for_document(doc: &Document) -> Self {
        let normalized = normalize_term(&doc.sanitized_text);
        Self {
            year: doc.year,
            words: normalized.split(' ').filter(|w| !w.is_empty()).map(String::from).collect(),
        }
    }

    /// `None` unless every token prefixes at least one word.
    fn score(&self, tokens: &[String]) -> Option<f64> {
        if self.words.is_empty() {
            return None;
        }
        let mut total = 0usize;
        for token in tokens {
            let tf = self.words.iter().filter(|w| w.starts_with(token.as_str())).count();
            if tf == 0 {
                return None;
            }
            total += tf;
        }
        Some(-(total as f64) / (self.words.len() as f64).sqrt())
    }
}

#[derive(Default)]
struct Inner {
    docs: BTreeMap<String, Document>,
    index: BTreeMap<String, IndexEntry>,
}

impl Inner {
    fn relevance(&self, query: &RelevanceQuery, window: Window) -> HitPage {
        let tokens: Vec<String> = query
            .tokens
            .iter()
            .map(|t| normalize_term(t))
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            return HitPage::default();
        }

        let matches: Vec<(&String, f64)> = self
            .index
            .iter()
            .filter(|(_, entry)| query.year.is_none() || entry.year == query.year)
            .filter_map(|(id, entry)| entry.score(&tokens).map(|s| (id, s)))
            .collect();
        let index_matches = matches.len();

        let mut joined: Vec<Hit> = matches
            .into_iter()
            .filter_map(|(id, score)| self.docs.get(id).map(|d| Hit::from_document(d, Some(score))))
            .collect();
        joined.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });

        let total = joined.len();

        HitPage {
            hits: paginate(joined, window),
            total,
            orphaned: index_matches - total,
        }
    }

    fn remove_orphans(&mut self) -> usize {
        let docs = &self.docs;
        let before = self.index.len();
        self.index.retain(|id, _| docs.contains_key(id));
        before - self.index.len()
    }

    fn recency<F>(&self, year: Option<i32>, window: Window, keep: F) -> HitPage
    where
        F: Fn(&Document) -> bool,
    {
        let mut rows: Vec<&Document> = self
            .docs
            .values()
            .filter(|d| year.is_none() || d.year == year)
            .filter(|d| keep(d))
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        let total = rows.len();
        let hits = rows.into_iter().map(|d| Hit::from_document(d, None)).collect();
        HitPage::new(paginate(hits, window), total)
    }
}

fn paginate(rows: Vec<Hit>, window: Window) -> Vec<Hit> {
    rows.into_iter().skip(window.offset).take(window.limit).collect()
}

/// In-memory store for tests and embedding.
pub struct InMemoryStore {
    inner: RwLock<Inner>,
    relevance_index: bool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            relevance_index: true,
        }
    }

    /// A store that reports no relevance index, forcing substring search.
    pub fn without_relevance_index() -> Self {
        Self {
            relevance_index: false,
            ..Self::new()
        }
    }

    /// Removes a document but leaves its index entry behind.
    pub fn detach_document(&self, id: &str) -> StoreResult<bool> {
        Ok(self.write()?.docs.remove(id).is_some())
    }

    /// Number of index entries, orphans included.
    pub fn index_len(&self) -> StoreResult<usize> {
        Ok(self.read()?.index.len())
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend(anyhow!("in-memory store lock poisoned")))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend(anyhow!("in-memory store lock poisoned")))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_document(&self, doc: &Document) -> StoreResult<UpsertOutcome> {
        let mut inner = self.write()?;
        let mut stored = doc.clone();
        let outcome = match inner.docs.get(&doc.id) {
            Some(existing) => {
                stored.created_at = existing.created_at;
                UpsertOutcome::Updated
            }
            None => UpsertOutcome::Inserted,
        };
        inner
            .index
            .insert(doc.id.clone(), IndexEntry::for_document(&stored));
        inner.docs.insert(doc.id.clone(), stored);
        Ok(outcome)
    }

    async fn get_document(&self, id: &str) -> StoreResult<Option<Document>> {
        Ok(self.read()?.docs.get(id).cloned())
    }

    async fn delete_document(&self, id: &str) -> StoreResult<bool> {
        let mut inner = self.write()?;
        inner.index.remove(id);
        Ok(inner.docs.remove(id).is_some())
    }

    async fn has_relevance_index(&self) -> StoreResult<bool> {
        Ok(self.relevance_index)
    }

    async fn relevance_page(&self, query: &RelevanceQuery, window: Window) -> StoreResult<HitPage> {
        if !self.relevance_index {
            return Err(StoreError::Unavailable("no relevance index".into()));
        }
        Ok(self.read()?.relevance(query, window))
    }

    async fn heal_and_retry(
        &self,
        query: &RelevanceQuery,
        window: Window,
    ) -> StoreResult<HealedPage> {
        if !self.relevance_index {
            return Err(StoreError::Unavailable("no relevance index".into()));
        }
        let mut inner = self.write()?;
        let orphans_removed = inner.remove_orphans();
        let page = inner.relevance(query, window);
        Ok(HealedPage {
            page,
            orphans_removed,
        })
    }

    async fn substring_page(
        &self,
        tokens: &[String],
        year: Option<i32>,
        window: Window,
    ) -> StoreResult<HitPage> {
        if tokens.is_empty() {
            return Ok(HitPage::default());
        }
        let needles: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        Ok(self.read()?.recency(year, window, |doc| {
            let haystack = doc.excerpt.to_lowercase();
            needles.iter().all(|n| haystack.contains(n.as_str()))
        }))
    }

    async fn all_page(&self, year: Option<i32>, window: Window) -> StoreResult<HitPage> {
        Ok(self.read()?.recency(year, window, |_| true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NoteStatus;

    fn doc(id: &str, year: i32, text: &str, updated_at: i64) -> Document {
        Document {
            id: id.to_string(),
            year: Some(year),
            filename: format!("{}.pdf", id),
            source_path: None,
            original_text: text.to_string(),
            sanitized_text: text.to_string(),
            excerpt: text.to_string(),
            status: NoteStatus::InForce,
            status_note: None,
            created_at: updated_at,
            updated_at,
        }
    }

    fn query(tokens: &[&str]) -> RelevanceQuery {
        RelevanceQuery::new(tokens.iter().map(|t| t.to_string()).collect(), None)
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = InMemoryStore::new();
        let first = doc("a", 2024, "texto", 1);
        assert_eq!(store.upsert_document(&first).await.unwrap(), UpsertOutcome::Inserted);

        let mut again = doc("a", 2024, "texto novo", 5);
        again.created_at = 5;
        assert_eq!(store.upsert_document(&again).await.unwrap(), UpsertOutcome::Updated);

        let stored = store.get_document("a").await.unwrap().unwrap();
        assert_eq!(stored.created_at, 1);
        assert_eq!(stored.sanitized_text, "texto novo");
        assert_eq!(store.index_len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_relevance_prefix_and_accents() {
        let store = InMemoryStore::new();
        store.upsert_document(&doc("a", 2024, "Previdência e aposentadoria", 1)).await.unwrap();
        store.upsert_document(&doc("b", 2023, "aposentadoria aposentadoria rural", 2)).await.unwrap();

        let page = store.relevance_page(&query(&["aposent"]), Window::new(0, 10)).await.unwrap();
        assert_eq!(page.total, 2);
        let ids: Vec<&str> = page.hits.iter().map(|h| h.document_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        let page = store.relevance_page(&query(&["previdencia", "apos"]), Window::new(0, 10)).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.hits[0].document_id, "a");
    }

    #[tokio::test]
    async fn test_orphan_counts_until_healed() {
        let store = InMemoryStore::new();
        store.upsert_document(&doc("a", 2024, "pensão", 1)).await.unwrap();
        store.upsert_document(&doc("b", 2024, "pensão", 2)).await.unwrap();
        assert!(store.detach_document("b").unwrap());

        let q = query(&["pensão"]);
        let page = store.relevance_page(&q, Window::new(0, 10)).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.orphaned, 1);
        assert_eq!(page.hits.len(), 1);

        let healed = store.heal_and_retry(&q, Window::new(0, 10)).await.unwrap();
        assert_eq!(healed.orphans_removed, 1);
        assert_eq!(healed.page.total, 1);
        assert_eq!(healed.page.orphaned, 0);
        assert_eq!(store.index_len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_substring_and_all_pages_use_recency() {
        let store = InMemoryStore::new();
        store.upsert_document(&doc("a", 2023, "Aposentadoria especial", 1)).await.unwrap();
        store.upsert_document(&doc("b", 2024, "aposentadoria rural", 3)).await.unwrap();
        store.upsert_document(&doc("c", 2024, "pensão", 2)).await.unwrap();

        let page = store
            .substring_page(&["posentado".to_string()], None, Window::new(0, 10))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.hits[0].document_id, "b");
        assert!(page.hits.iter().all(|h| h.score.is_none()));

        let page = store.all_page(Some(2024), Window::new(1, 10)).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.hits.len(), 1);
        assert_eq!(page.hits[0].document_id, "c");
    }

    #[tokio::test]
    async fn test_without_relevance_index() {
        let store = InMemoryStore::without_relevance_index();
        assert!(!store.has_relevance_index().await.unwrap());
        let err = store.relevance_page(&query(&["x"]), Window::new(0, 1)).await;
        assert!(matches!(err, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_delete_removes_index_entry() {
        let store = InMemoryStore::new();
        store.upsert_document(&doc("a", 2024, "texto", 1)).await.unwrap();
        assert!(store.delete_document("a").await.unwrap());
        assert!(!store.delete_document("a").await.unwrap());
        assert_eq!(store.index_len().unwrap(), 0);
    }
}
