//! Offset-preserving text normalization.
//!
//! Converts arbitrary text into the canonical matching form used by the
//! redaction pipeline while keeping an exact map back to the original text.
//!
//! Normalization happens in two stages:
//!
//! 1. **Character folding** — every original `char` is decomposed (NFD),
//!    stripped of combining marks and lowercased. Alphanumeric results are
//!    kept; anything else becomes a single space. Each folded character
//!    remembers the byte range of the original character it came from.
//! 2. **Whitespace collapse** — runs of spaces collapse to one space and the
//!    result is trimmed. Each emitted character remembers which stage-1
//!    character it derives from.
//!
//! Composing both maps translates any byte range of the normalized text back
//! to a `[start, end)` byte range of the original text, even though
//! characters were folded, merged or deleted along the way.
//!
//! ```
//! use note_vault_core::normalize::NormalizedText;
//!
//! let original = "Sr. JOÃO  da-Silva";
//! let norm = NormalizedText::new(original);
//! assert_eq!(norm.as_str(), "sr joao da silva");
//!
//! let start = norm.as_str().find("joao").unwrap();
//! let range = norm.original_range(start, start + 4).unwrap();
//! assert_eq!(&original[range], "JOÃO");
//! ```

use std::ops::Range;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalized text plus the composed offset maps back to the original.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedText {
    text: String,
    /// Stage 1: original byte range per folded character.
    folded: Vec<Range<usize>>,
    /// Stage 2: `(byte offset in text, index into folded)` per emitted character.
    collapsed: Vec<(usize, usize)>,
}

impl NormalizedText {
    pub fn new(original: &str) -> Self {
        let folded = fold(original);

        let mut text = String::with_capacity(folded.len());
        let mut collapsed = Vec::with_capacity(folded.len());
        let mut prev_space = true;

        for (i, (ch, _)) in folded.iter().enumerate() {
            if ch.is_alphanumeric() {
                collapsed.push((text.len(), i));
                text.push(*ch);
                prev_space = false;
            } else if !prev_space {
                collapsed.push((text.len(), i));
                text.push(' ');
                prev_space = true;
            }
        }

        if text.ends_with(' ') {
            text.pop();
            collapsed.pop();
        }

        Self {
            text,
            folded: folded.into_iter().map(|(_, range)| range).collect(),
            collapsed,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Number of characters in the normalized text.
    pub fn char_len(&self) -> usize {
        self.collapsed.len()
    }

    /// Stage-1 map: original byte range of the folded character at `index`.
    pub fn folded_origin(&self, index: usize) -> Option<Range<usize>> {
        self.folded.get(index).cloned()
    }

    /// Stage-2 map: stage-1 index of the normalized character at `index`.
    pub fn collapsed_origin(&self, index: usize) -> Option<usize> {
        self.collapsed.get(index).map(|(_, folded)| *folded)
    }

    /// Translates a byte range of the normalized text into the original text.
    ///
    /// `start` must fall on a character boundary of the normalized text.
    /// Returns `None` for empty or out-of-range input.
    pub fn original_range(&self, start: usize, end: usize) -> Option<Range<usize>> {
        if start >= end || end > self.text.len() {
            return None;
        }
        let first = self
            .collapsed
            .binary_search_by_key(&start, |(byte, _)| *byte)
            .ok()?;
        let last = self
            .collapsed
            .partition_point(|(byte, _)| *byte < end)
            .checked_sub(1)?;
        if last < first {
            return None;
        }
        let head = &self.folded[self.collapsed[first].1];
        let tail = &self.folded[self.collapsed[last].1];
        Some(head.start..tail.end)
    }
}

/// Canonical matching form of a single term: the normalized text without maps.
pub fn normalize_term(term: &str) -> String {
    NormalizedText::new(term).text
}

fn fold(original: &str) -> Vec<(char, Range<usize>)> {
    let mut out: Vec<(char, Range<usize>)> = Vec::with_capacity(original.len());

    for (start, ch) in original.char_indices() {
        let range = start..start + ch.len_utf8();

        // A bare combining mark belongs to the character before it.
        if is_combining_mark(ch) {
            if let Some(owner) = out.last().map(|(_, r)| r.start) {
                for (_, r) in out.iter_mut().rev().take_while(|(_, r)| r.start == owner) {
                    r.end = range.end;
                }
            }
            continue;
        }

        let mut emitted = false;
        for c in std::iter::once(ch)
            .nfd()
            .filter(|c| !is_combining_mark(*c))
            .flat_map(char::to_lowercase)
        {
            if c.is_alphanumeric() {
                out.push((c, range.clone()));
                emitted = true;
            }
        }
        if !emitted {
            out.push((' ', range));
        }
    }

    out
}
