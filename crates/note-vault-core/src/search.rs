//! Tiered search coordinator.
//!
//! [`search`] runs a single query through an explicit state machine over the
//! [`Store`] trait:
//!
//! 1. **Tokenize**: at most 8 lowercase alphanumeric tokens of 2+ chars.
//! 2. **Primary**: AND-of-prefixes against the relevance index, optionally
//!    restricted to one year, returning a ranked page and the index total.
//! 3. **SelfHeal**: when any matching index entry has no document (or the
//!    page is shorter than the total implies), orphan index entries are
//!    removed and the primary query re-run, atomically and at most once.
//! 4. **Substring**: when the index has no matches (or does not exist), a
//!    case-insensitive substring conjunction over stored excerpts.
//! 5. **AllDocuments**: bypasses tokenization and lists every document.
//!
//! The coordinator is total: a missing or failing store degrades to an empty
//! outcome tagged [`Mechanism::Unavailable`], never an error.

use serde::Serialize;

use crate::models::{Mechanism, QueryResult};
use crate::store::{HitPage, RelevanceQuery, Store, StoreError, Window};

/// Input that explicitly requests the all-documents listing.
pub const ALL_DOCUMENTS_SENTINEL: &str = "__ALL__";
pub const MAX_QUERY_TOKENS: usize = 8;
pub const MIN_TOKEN_CHARS: usize = 2;

/// Splits a query into at most [`MAX_QUERY_TOKENS`] lowercase tokens.
pub fn tokenize(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .take(MAX_QUERY_TOKENS)
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum SearchQuery {
    Text(String),
    All,
}

impl SearchQuery {
    /// Interprets raw user input.
    ///
    /// The sentinel always lists everything. Blank input lists everything
    /// only when `list_all_on_empty` is set; otherwise it stays a text query
    /// with no tokens and yields an empty result.
    pub fn from_input(input: &str, list_all_on_empty: bool) -> Self {
        let trimmed = input.trim();
        if trimmed == ALL_DOCUMENTS_SENTINEL || (trimmed.is_empty() && list_all_on_empty) {
            SearchQuery::All
        } else {
            SearchQuery::Text(trimmed.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: SearchQuery,
    pub year: Option<i32>,
    pub window: Window,
}

/// Everything a caller needs to render or page through results.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub rows: Vec<QueryResult>,
    /// Total reported by the same mechanism that produced `rows`.
    pub total: usize,
    pub mechanism: Mechanism,
    pub tokens: Vec<String>,
    pub window: Window,
    pub orphans_removed: usize,
    /// Reason for an unexpected degradation, when there was one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

impl SearchOutcome {
    fn empty(mechanism: Mechanism, tokens: Vec<String>, window: Window) -> Self {
        Self {
            rows: Vec::new(),
            total: 0,
            mechanism,
            tokens,
            window,
            orphans_removed: 0,
            degraded: None,
        }
    }
}

enum Step<'q> {
    Tokenize(&'q str),
    Primary(RelevanceQuery),
    SelfHeal(RelevanceQuery),
    Substring,
    AllDocuments,
    Done(HitPage, Mechanism),
}

/// Runs one query through the tier state machine.
///
/// `store` is `None` when the backing store could not be opened at all.
pub async fn search<S: Store + ?Sized>(store: Option<&S>, req: &SearchRequest) -> SearchOutcome {
    let window = req.window;
    let Some(store) = store else {
        tracing::warn!("search requested without a store");
        return SearchOutcome::empty(Mechanism::Unavailable, Vec::new(), window);
    };

    let mut tokens: Vec<String> = Vec::new();
    let mut orphans_removed = 0usize;
    let mut step = match &req.query {
        SearchQuery::All => Step::AllDocuments,
        SearchQuery::Text(text) => Step::Tokenize(text.as_str()),
    };

    loop {
        step = match step {
            Step::Tokenize(text) => {
                tokens = tokenize(text);
                if tokens.is_empty() {
                    tracing::debug!("query has no usable tokens");
                    Step::Done(HitPage::default(), Mechanism::SubstringFallback)
                } else {
                    match store.has_relevance_index().await {
                        Ok(true) => Step::Primary(RelevanceQuery::new(tokens.clone(), req.year)),
                        Ok(false) => {
                            tracing::debug!("no relevance index, using substring search");
                            Step::Substring
                        }
                        Err(e) => return unavailable(e, tokens, window),
                    }
                }
            }

            Step::Primary(query) => {
                let result = store.relevance_page(&query, window).await;
                match result {
                    Ok(page)
                        if page.orphaned > 0
                            || page.hits.len() < window.expected_rows(page.total) =>
                    {
                        tracing::debug!(
                            total = page.total,
                            orphaned = page.orphaned,
                            rows = page.hits.len(),
                            "relevance index diverged from documents"
                        );
                        Step::SelfHeal(query)
                    }
                    Ok(page) if page.total == 0 => Step::Substring,
                    Ok(page) => Step::Done(page, Mechanism::PrimaryIndex),
                    Err(StoreError::MalformedQuery(reason)) => {
                        tracing::debug!(%reason, "relevance query rejected, using substring search");
                        Step::Substring
                    }
                    Err(e) => return unavailable(e, tokens, window),
                }
            }

            Step::SelfHeal(query) => match store.heal_and_retry(&query, window).await {
                Ok(healed) => {
                    orphans_removed = healed.orphans_removed;
                    if orphans_removed > 0 {
                        tracing::info!(removed = orphans_removed, "removed orphan index entries");
                    }
                    if healed.page.total == 0 {
                        Step::Substring
                    } else {
                        Step::Done(healed.page, Mechanism::PrimaryIndexWithSelfHeal)
                    }
                }
                Err(StoreError::MalformedQuery(reason)) => {
                    tracing::debug!(%reason, "relevance query rejected, using substring search");
                    Step::Substring
                }
                Err(e) => return unavailable(e, tokens, window),
            },

            Step::Substring => match store.substring_page(&tokens, req.year, window).await {
                Ok(page) => Step::Done(page, Mechanism::SubstringFallback),
                Err(e) => return unavailable(e, tokens, window),
            },

            Step::AllDocuments => match store.all_page(req.year, window).await {
                Ok(page) => Step::Done(page, Mechanism::AllDocuments),
                Err(e) => return unavailable(e, tokens, window),
            },

            Step::Done(page, mechanism) => {
                return SearchOutcome {
                    rows: page
                        .hits
                        .into_iter()
                        .map(|hit| hit.into_result(mechanism))
                        .collect(),
                    total: page.total,
                    mechanism,
                    tokens,
                    window,
                    orphans_removed,
                    degraded: None,
                };
            }
        };
    }
}

fn unavailable(err: StoreError, tokens: Vec<String>, window: Window) -> SearchOutcome {
    let mut outcome = SearchOutcome::empty(Mechanism::Unavailable, tokens, window);
    match err {
        StoreError::Unavailable(reason) => {
            tracing::warn!(%reason, "store unavailable");
        }
        other => {
            tracing::warn!(error = %other, "search degraded");
            outcome.degraded = Some(other.to_string());
        }
    }
    outcome
}
