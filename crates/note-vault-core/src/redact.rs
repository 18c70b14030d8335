//! Whole-word blocklist redaction.
//!
//! A [`Blocklist`] holds normalized terms. [`Blocklist::find_spans`]
//! normalizes a document once, scans it for boundary-respecting occurrences
//! of every term, maps each hit back to original byte offsets and merges the
//! result into sorted, non-overlapping [`Span`]s. A [`Redactor`] replaces each
//! merged span with a single marker token.
//!
//! Matching is accent- and case-insensitive and never matches inside a word:
//! the term `"ana"` redacts `"Ana Silva"` but leaves `"banana"` untouched.

use std::collections::HashSet;

use serde::Serialize;

use crate::normalize::{normalize_term, NormalizedText};

/// Marker substituted for every redacted span.
pub const DEFAULT_MARKER: &str = "[REMOVIDO]";

/// Half-open `[start, end)` byte range of the original text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A de-duplicated set of normalized blocklist terms.
#[derive(Debug, Clone, Default)]
pub struct Blocklist {
    terms: Vec<String>,
}

impl Blocklist {
    /// Builds a blocklist from raw terms.
    ///
    /// Every term is normalized; terms that normalize to the empty string
    /// match nothing and are skipped.
    pub fn from_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for term in terms {
            let normalized = normalize_term(term.as_ref());
            if normalized.is_empty() {
                tracing::debug!(term = term.as_ref(), "skipping blocklist term with empty normalized form");
                continue;
            }
            if seen.insert(normalized.clone()) {
                out.push(normalized);
            }
        }
        Self { terms: out }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Merged spans covering every whole-word occurrence of every term.
    pub fn find_spans(&self, text: &str) -> Vec<Span> {
        merge_spans(self.raw_spans(text))
    }

    /// Unmerged hits in original-text coordinates, in term order.
    pub fn raw_spans(&self, text: &str) -> Vec<Span> {
        if text.is_empty() || self.terms.is_empty() {
            return Vec::new();
        }

        let norm = NormalizedText::new(text);
        if norm.is_empty() {
            return Vec::new();
        }

        let mut spans = Vec::new();
        for term in &self.terms {
            for (start, end) in whole_word_matches(norm.as_str(), term) {
                if let Some(range) = norm.original_range(start, end) {
                    spans.push(Span::new(range.start, range.end));
                }
            }
        }
        spans
    }
}

/// Finds `needle` in normalized `haystack` where it is bounded by a space or
/// the text edge on both sides. Returns byte ranges of the haystack.
fn whole_word_matches(haystack: &str, needle: &str) -> Vec<(usize, usize)> {
    let mut hits = Vec::new();
    if needle.is_empty() {
        return hits;
    }

    let bytes = haystack.as_bytes();
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(needle) {
        let start = from + pos;
        let end = start + needle.len();
        let left_ok = start == 0 || bytes[start - 1] == b' ';
        let right_ok = end == bytes.len() || bytes[end] == b' ';

        if left_ok && right_ok {
            hits.push((start, end));
            from = end;
        } else {
            // retry one character later; a valid hit may overlap this one
            from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
        }
        if from >= haystack.len() {
            break;
        }
    }
    hits
}

/// Sorts spans and merges any span starting at or before the running end.
///
/// Touching spans (`(3,10)` and `(10,15)`) merge just like overlapping ones,
/// so the output is strictly increasing.
pub fn merge_spans(mut spans: Vec<Span>) -> Vec<Span> {
    if spans.is_empty() {
        return spans;
    }
    spans.sort();

    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => {
                last.end = last.end.max(span.end);
            }
            _ => merged.push(span),
        }
    }
    merged
}

/// Copies `text` replacing every span with `marker`.
///
/// `spans` must be sorted and non-overlapping, as produced by [`merge_spans`].
pub fn apply_spans(text: &str, spans: &[Span], marker: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in spans {
        debug_assert!(span.start >= cursor, "spans must be merged before applying");
        out.push_str(&text[cursor..span.start]);
        out.push_str(marker);
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Applies a [`Blocklist`] to text, substituting a fixed marker.
#[derive(Debug, Clone)]
pub struct Redactor {
    blocklist: Blocklist,
    marker: String,
}

impl Redactor {
    pub fn new(blocklist: Blocklist, marker: impl Into<String>) -> Self {
        Self {
            blocklist,
            marker: marker.into(),
        }
    }

    pub fn with_default_marker(blocklist: Blocklist) -> Self {
        Self::new(blocklist, DEFAULT_MARKER)
    }

    pub fn blocklist(&self) -> &Blocklist {
        &self.blocklist
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Merged spans to redact. Hits touching an existing marker are ignored,
    /// so redacting already-redacted text is a no-op.
    pub fn spans(&self, text: &str) -> Vec<Span> {
        let mut raw = self.blocklist.raw_spans(text);
        if !self.marker.is_empty() {
            let markers: Vec<Span> = text
                .match_indices(self.marker.as_str())
                .map(|(start, m)| Span::new(start, start + m.len()))
                .collect();
            if !markers.is_empty() {
                raw.retain(|span| !markers.iter().any(|m| m.overlaps(span)));
            }
        }
        merge_spans(raw)
    }

    pub fn redact(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let spans = self.spans(text);
        if spans.is_empty() {
            return text.to_string();
        }
        apply_spans(text, &spans, &self.marker)
    }
}
