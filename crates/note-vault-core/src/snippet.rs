//! Contextual excerpts from paginated source text.
//!
//! [`extract_snippet`] finds the first occurrence of any query term, page by
//! page, and returns a window of words around it. Only the first page with a
//! match contributes; an empty string means nothing matched and the caller
//! should fall back to a stored excerpt.

use once_cell::sync::Lazy;
use regex::Regex;

/// Words, or single non-space characters standing on their own.
static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w+)|(\S)").expect("token pattern is valid"));

pub const DEFAULT_WINDOW_WORDS: usize = 100;
pub const LEADING_ELLIPSIS: &str = "… ";
pub const TRAILING_ELLIPSIS: &str = " …";

/// Window size around the anchoring word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnippetOptions {
    pub before_words: usize,
    pub after_words: usize,
}

impl SnippetOptions {
    pub fn symmetric(words: usize) -> Self {
        Self {
            before_words: words,
            after_words: words,
        }
    }
}

impl Default for SnippetOptions {
    fn default() -> Self {
        Self::symmetric(DEFAULT_WINDOW_WORDS)
    }
}

#[derive(Debug, Clone, Copy)]
struct Token {
    start: usize,
    end: usize,
    word: bool,
}

/// Case-insensitive alternation of the escaped, non-empty terms.
fn term_pattern<S: AsRef<str>>(terms: &[S]) -> Option<Regex> {
    let alternatives: Vec<String> = terms
        .iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return None;
    }
    match Regex::new(&format!("(?i)(?:{})", alternatives.join("|"))) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::debug!(error = %e, "snippet term pattern rejected");
            None
        }
    }
}

fn tokenize_page(text: &str) -> Vec<Token> {
    TOKEN_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(Token {
                start: whole.start(),
                end: whole.end(),
                word: caps.get(1).is_some(),
            })
        })
        .collect()
}

/// Excerpt around the first match of any term, or `""` when none match.
pub fn extract_snippet<P, T>(pages: &[P], terms: &[T], opts: SnippetOptions) -> String
where
    P: AsRef<str>,
    T: AsRef<str>,
{
    let Some(pattern) = term_pattern(terms) else {
        return String::new();
    };

    for (page_no, page) in pages.iter().enumerate() {
        let text = page.as_ref();
        if text.is_empty() {
            continue;
        }
        let Some(found) = pattern.find(text) else {
            continue;
        };
        if let Some(snippet) = window_around(text, found.start(), opts) {
            tracing::trace!(page = page_no + 1, "snippet anchored");
            return snippet;
        }
    }
    String::new()
}

fn window_around(text: &str, match_start: usize, opts: SnippetOptions) -> Option<String> {
    let tokens = tokenize_page(text);
    let match_tok = tokens
        .iter()
        .position(|t| t.start <= match_start && match_start < t.end)?;

    let words: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| t.word)
        .map(|(i, _)| i)
        .collect();
    let last_word = words.len().checked_sub(1)?;

    // a match on punctuation anchors to the next word
    let word_pos = words
        .iter()
        .position(|&i| i >= match_tok)
        .unwrap_or(last_word);

    let left_w = word_pos.saturating_sub(opts.before_words);
    let right_w = (word_pos + opts.after_words).min(last_word);

    let start = if left_w == 0 {
        tokens.first()?.start
    } else {
        tokens[words[left_w]].start
    };
    let end = if right_w == last_word {
        tokens.last()?.end
    } else {
        tokens[words[right_w]].end
    };

    let mut snippet = String::with_capacity(end - start + 8);
    if left_w > 0 {
        snippet.push_str(LEADING_ELLIPSIS);
    }
    snippet.push_str(&text[start..end]);
    if right_w < last_word {
        snippet.push_str(TRAILING_ELLIPSIS);
    }
    Some(snippet)
}
