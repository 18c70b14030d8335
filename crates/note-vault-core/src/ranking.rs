//! Result composition: excerpts, redaction, year grouping and paging.
//!
//! [`compose`] turns a [`SearchOutcome`] into a [`ResultPage`] ready for
//! display. Each row gets the best excerpt available (a snippet extracted
//! from the source pages, else the stored excerpt, else a placeholder), text
//! is redacted before it leaves this module, and rows are grouped by year
//! with the newest year first.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::models::{Mechanism, NoteStatus, QueryResult, Rank};
use crate::redact::Redactor;
use crate::search::SearchOutcome;
use crate::snippet::{extract_snippet, SnippetOptions};

pub const DEFAULT_PLACEHOLDER: &str = "(sem trecho disponível no PDF para os termos buscados)";
pub const UNTITLED: &str = "(sem título)";
pub const NO_YEAR_LABEL: &str = "Sem ano";

static EXTENSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(pdf|txt|docx?)$").expect("extension pattern is valid"));
static SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[_\-\s]+").expect("separator pattern is valid"));
static NOTE_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^nota\s+t[eé]cnica\s*(?:n\s*[ºo°.]\s*)?").expect("prefix pattern is valid")
});

/// Supplies the plain-text pages of a result's source document.
pub trait PageSource {
    /// `None` when the source cannot be located.
    fn pages(&self, row: &QueryResult) -> Option<Vec<String>>;
}

/// A page source that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPages;

impl PageSource for NoPages {
    fn pages(&self, _row: &QueryResult) -> Option<Vec<String>> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct ComposeOptions {
    pub snippet: SnippetOptions,
    pub placeholder: String,
    /// Also redact stored excerpts and placeholders, not only source text.
    pub redact_on_display: bool,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            snippet: SnippetOptions::default(),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            redact_on_display: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExcerptSource {
    Extracted,
    Stored,
    Placeholder,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultItem {
    pub document_id: String,
    pub title: String,
    pub filename: String,
    pub year: Option<i32>,
    pub status: NoteStatus,
    pub status_label: &'static str,
    pub status_note: Option<String>,
    pub updated_at: String,
    pub rank: Rank,
    pub mechanism: Mechanism,
    pub excerpt: String,
    pub excerpt_source: ExcerptSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct YearGroup {
    pub year: Option<i32>,
    pub label: String,
    pub items: Vec<ResultItem>,
}

/// Offset arithmetic for a fixed-size page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub offset: usize,
    pub limit: usize,
    pub total: usize,
    /// 1-based.
    pub page: usize,
    pub page_count: usize,
    pub prev_offset: Option<usize>,
    pub next_offset: Option<usize>,
}

impl Pagination {
    pub fn new(offset: usize, limit: usize, total: usize) -> Self {
        let size = limit.max(1);
        Self {
            offset,
            limit,
            total,
            page: (offset / size).saturating_add(1),
            page_count: total.div_ceil(size),
            prev_offset: (offset > 0).then(|| offset.saturating_sub(size)),
            next_offset: offset.checked_add(size).filter(|next| *next < total),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultPage {
    pub mechanism: Mechanism,
    pub total: usize,
    pub tokens: Vec<String>,
    pub orphans_removed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
    pub groups: Vec<YearGroup>,
    pub pagination: Pagination,
}

impl ResultPage {
    pub fn items(&self) -> impl Iterator<Item = &ResultItem> {
        self.groups.iter().flat_map(|g| g.items.iter())
    }
}

pub fn year_label(year: Option<i32>) -> String {
    match year {
        Some(y) => format!("Ano {}", y),
        None => NO_YEAR_LABEL.to_string(),
    }
}

/// Readable title derived from a stored filename.
pub fn display_title(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let base = EXTENSION_RE.replace(base, "");
    let base = SEPARATOR_RE.replace_all(&base, " ");
    let base = NOTE_PREFIX_RE.replace(base.trim(), "Nota Técnica ");
    let title = base.trim();
    if title.is_empty() {
        UNTITLED.to_string()
    } else {
        title.to_string()
    }
}

/// First line of the text when it looks like a heading (8 to 180 chars).
pub fn title_from_text(text: &str) -> Option<String> {
    let first = text.trim().lines().next()?.trim();
    let len = first.chars().count();
    (8..=180).contains(&len).then(|| first.to_string())
}

/// Title for a note: derived from the filename, else the first line of its
/// text when the filename yields nothing usable.
pub fn note_title(filename: &str, text: &str) -> String {
    let title = display_title(filename);
    if title == UNTITLED {
        title_from_text(text).unwrap_or(title)
    } else {
        title
    }
}

/// Unix seconds as `YYYY-MM-DDTHH:MM:SSZ`; out-of-range values print as is.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Builds the display page for one search outcome.
pub fn compose<P: PageSource + ?Sized>(
    outcome: SearchOutcome,
    pages: &P,
    redactor: Option<&Redactor>,
    opts: &ComposeOptions,
) -> ResultPage {
    let pagination = Pagination::new(outcome.window.offset, outcome.window.limit, outcome.total);
    let relevance = outcome.mechanism.is_relevance();

    let mut rows = outcome.rows;
    // stable: recency order survives inside a year
    rows.sort_by(|a, b| {
        let by_year = match (a.year, b.year) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        };
        if !relevance {
            return by_year;
        }
        let sa = a.rank.score().unwrap_or(f64::INFINITY);
        let sb = b.rank.score().unwrap_or(f64::INFINITY);
        by_year.then(sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut groups: Vec<YearGroup> = Vec::new();
    for row in rows {
        let item = compose_item(row, &outcome.tokens, pages, redactor, opts);
        match groups.last_mut() {
            Some(group) if group.year == item.year => group.items.push(item),
            _ => groups.push(YearGroup {
                year: item.year,
                label: year_label(item.year),
                items: vec![item],
            }),
        }
    }

    ResultPage {
        mechanism: outcome.mechanism,
        total: outcome.total,
        tokens: outcome.tokens,
        orphans_removed: outcome.orphans_removed,
        degraded: outcome.degraded,
        groups,
        pagination,
    }
}

fn compose_item<P: PageSource + ?Sized>(
    row: QueryResult,
    tokens: &[String],
    pages: &P,
    redactor: Option<&Redactor>,
    opts: &ComposeOptions,
) -> ResultItem {
    let extracted = if tokens.is_empty() {
        String::new()
    } else {
        pages
            .pages(&row)
            .map(|p| extract_snippet(&p, tokens, opts.snippet))
            .unwrap_or_default()
    };

    let (text, source) = if !extracted.is_empty() {
        (extracted, ExcerptSource::Extracted)
    } else if !row.excerpt.trim().is_empty() {
        (row.excerpt.clone(), ExcerptSource::Stored)
    } else {
        (opts.placeholder.clone(), ExcerptSource::Placeholder)
    };

    // source text is always redacted; the rest only on request
    let must_redact = source == ExcerptSource::Extracted || opts.redact_on_display;
    let excerpt = match redactor {
        Some(r) if must_redact => r.redact(&text),
        _ => text,
    };

    ResultItem {
        title: note_title(&row.filename, &row.excerpt),
        status_label: row.status.label(),
        updated_at: format_ts_iso(row.updated_at),
        document_id: row.document_id,
        filename: row.filename,
        year: row.year,
        status: row.status,
        status_note: row.status_note,
        rank: row.rank,
        mechanism: row.mechanism,
        excerpt,
        excerpt_source: source,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::redact::Blocklist;
    use crate::store::Window;

    fn row(id: &str, year: Option<i32>, rank: Rank, excerpt: &str) -> QueryResult {
        let mechanism = match rank {
            Rank::Score(_) => Mechanism::PrimaryIndex,
            Rank::Recency(_) => Mechanism::SubstringFallback,
        };
        QueryResult {
            document_id: id.to_string(),
            year,
            filename: format!("{}.pdf", id),
            source_path: None,
            excerpt: excerpt.to_string(),
            status: NoteStatus::InForce,
            status_note: None,
            updated_at: 0,
            rank,
            mechanism,
        }
    }

    fn outcome(rows: Vec<QueryResult>, mechanism: Mechanism, tokens: &[&str]) -> SearchOutcome {
        SearchOutcome {
            total: rows.len(),
            rows,
            mechanism,
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            window: Window::new(0, 20),
            orphans_removed: 0,
            degraded: None,
        }
    }

    struct MapPages(HashMap<String, Vec<String>>);

    impl PageSource for MapPages {
        fn pages(&self, row: &QueryResult) -> Option<Vec<String>> {
            self.0.get(&row.document_id).cloned()
        }
    }

    #[test]
    fn test_groups_by_year_descending() {
        let rows = vec![
            row("a", Some(2023), Rank::Score(-2.0), "x"),
            row("b", None, Rank::Score(-3.0), "x"),
            row("c", Some(2024), Rank::Score(-1.0), "x"),
            row("d", Some(2024), Rank::Score(-5.0), "x"),
        ];
        let page = compose(
            outcome(rows, Mechanism::PrimaryIndex, &["x"]),
            &NoPages,
            None,
            &ComposeOptions::default(),
        );
        let labels: Vec<&str> = page.groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, vec!["Ano 2024", "Ano 2023", "Sem ano"]);
        let ids: Vec<&str> = page.items().map(|i| i.document_id.as_str()).collect();
        assert_eq!(ids, vec!["d", "c", "a", "b"]);
    }

    #[test]
    fn test_recency_order_kept_within_year() {
        let rows = vec![
            row("new", Some(2024), Rank::Recency(9), "x"),
            row("old", Some(2024), Rank::Recency(1), "x"),
        ];
        let page = compose(
            outcome(rows, Mechanism::SubstringFallback, &["x"]),
            &NoPages,
            None,
            &ComposeOptions::default(),
        );
        let ids: Vec<&str> = page.items().map(|i| i.document_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn test_excerpt_preference_and_redaction() {
        let mut sources = HashMap::new();
        sources.insert(
            "a".to_string(),
            vec!["Parecer de Ana Souza sobre aposentadoria.".to_string()],
        );
        let rows = vec![
            row("a", Some(2024), Rank::Score(-1.0), "stored a"),
            row("b", Some(2024), Rank::Score(-0.5), "Ana pediu aposentadoria"),
            row("c", Some(2024), Rank::Score(-0.1), "  "),
        ];
        let redactor = Redactor::with_default_marker(Blocklist::from_terms(["Ana Souza", "ana"]));
        let page = compose(
            outcome(rows, Mechanism::PrimaryIndex, &["aposentadoria"]),
            &MapPages(sources),
            Some(&redactor),
            &ComposeOptions::default(),
        );
        let items: Vec<&ResultItem> = page.items().collect();
        assert_eq!(items[0].excerpt_source, ExcerptSource::Extracted);
        assert_eq!(items[0].excerpt, "Parecer de [REMOVIDO] sobre aposentadoria.");
        assert_eq!(items[1].excerpt_source, ExcerptSource::Stored);
        assert_eq!(items[1].excerpt, "[REMOVIDO] pediu aposentadoria");
        assert_eq!(items[2].excerpt_source, ExcerptSource::Placeholder);
        assert_eq!(items[2].excerpt, DEFAULT_PLACEHOLDER);
    }

    #[test]
    fn test_stored_excerpt_left_alone_without_display_redaction() {
        let rows = vec![row("b", Some(2024), Rank::Score(-0.5), "Ana pediu")];
        let redactor = Redactor::with_default_marker(Blocklist::from_terms(["ana"]));
        let opts = ComposeOptions {
            redact_on_display: false,
            ..ComposeOptions::default()
        };
        let page = compose(
            outcome(rows, Mechanism::PrimaryIndex, &["pediu"]),
            &NoPages,
            Some(&redactor),
            &opts,
        );
        assert_eq!(page.groups[0].items[0].excerpt, "Ana pediu");
    }

    #[test]
    fn test_pagination_arithmetic() {
        let first = Pagination::new(0, 20, 35);
        assert_eq!(first.page, 1);
        assert_eq!(first.page_count, 2);
        assert_eq!(first.prev_offset, None);
        assert_eq!(first.next_offset, Some(20));

        let second = Pagination::new(20, 20, 35);
        assert_eq!(second.page, 2);
        assert_eq!(second.prev_offset, Some(0));
        assert_eq!(second.next_offset, None);

        let empty = Pagination::new(0, 20, 0);
        assert_eq!(empty.page_count, 0);
        assert_eq!(empty.next_offset, None);
    }

    #[test]
    fn test_pagination_past_the_end_does_not_overflow() {
        let p = Pagination::new(usize::MAX, 20, 5);
        assert_eq!(p.next_offset, None);
        assert_eq!(p.prev_offset, Some(usize::MAX - 20));
        assert_eq!(p.page_count, 1);
        assert!(p.page > 1);

        let p = Pagination::new(usize::MAX, 1, usize::MAX);
        assert_eq!(p.page, usize::MAX);
        assert_eq!(p.next_offset, None);
    }

    #[test]
    fn test_display_title() {
        assert_eq!(
            display_title("NOTA_TECNICA_Nº_123-2024.pdf"),
            "Nota Técnica 123 2024"
        );
        assert_eq!(
            display_title("dir/nota técnica no 7 2023.PDF"),
            "Nota Técnica 7 2023"
        );
        assert_eq!(display_title("Parecer final.txt"), "Parecer final");
        assert_eq!(
            display_title("nota tecnica nacional.pdf"),
            "Nota Técnica nacional"
        );
        assert_eq!(display_title(".pdf"), UNTITLED);
        assert_eq!(display_title(""), UNTITLED);
    }

    #[test]
    fn test_title_from_text() {
        assert_eq!(
            title_from_text("\n  Nota Técnica 12/2024 \ncorpo").as_deref(),
            Some("Nota Técnica 12/2024")
        );
        assert_eq!(title_from_text("curta\nresto"), None);
        assert_eq!(title_from_text(""), None);
    }

    #[test]
    fn test_note_title_falls_back_to_text() {
        assert_eq!(note_title("nt_3_2024.pdf", "Qualquer texto"), "nt 3 2024");
        assert_eq!(
            note_title(".pdf", "Orientação sobre o BPC\ncorpo"),
            "Orientação sobre o BPC"
        );
        assert_eq!(note_title(".pdf", "curto"), UNTITLED);
    }

    #[test]
    fn test_format_ts_iso() {
        assert_eq!(format_ts_iso(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_ts_iso(i64::MAX), i64::MAX.to_string());
    }
}
