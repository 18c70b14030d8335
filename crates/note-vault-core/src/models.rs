//! Core data models shared by the store, the search coordinator and ranking.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::normalize::normalize_term;

/// A technical note as persisted by a [`Store`](crate::store::Store).
///
/// `id` is the lowercase hex SHA-256 of the source bytes, so ingesting the
/// same file twice updates one row instead of creating a duplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub year: Option<i32>,
    pub filename: String,
    pub source_path: Option<String>,
    pub original_text: String,
    pub sanitized_text: String,
    /// Stored fallback excerpt, derived from the sanitized text.
    pub excerpt: String,
    pub status: NoteStatus,
    pub status_note: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Outcome of an idempotent document upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Whether a note is still in force.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    #[default]
    InForce,
    PartiallyRevoked,
    Revoked,
}

impl NoteStatus {
    pub const ALL: [NoteStatus; 3] = [
        NoteStatus::InForce,
        NoteStatus::PartiallyRevoked,
        NoteStatus::Revoked,
    ];

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            NoteStatus::InForce => "Vigente",
            NoteStatus::PartiallyRevoked => "Parcialmente revogada",
            NoteStatus::Revoked => "Revogada",
        }
    }

    /// Column value used by the SQLite store.
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteStatus::InForce => "in_force",
            NoteStatus::PartiallyRevoked => "partially_revoked",
            NoteStatus::Revoked => "revoked",
        }
    }
}

impl fmt::Display for NoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for NoteStatus {
    type Err = String;

    /// Accepts labels or snake_case names, ignoring case and accents.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_term(s);
        NoteStatus::ALL
            .into_iter()
            .find(|status| {
                normalize_term(status.label()) == wanted || normalize_term(status.as_str()) == wanted
            })
            .ok_or_else(|| {
                format!(
                    "unknown status '{}': expected one of Vigente, Parcialmente revogada, Revogada",
                    s
                )
            })
    }
}

/// A blocklist entry as stored by the term collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlocklistTerm {
    pub id: i64,
    pub category: String,
    pub term: String,
    pub normalized_form: String,
    pub enabled: bool,
}

/// How a query was actually satisfied. Always surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mechanism {
    PrimaryIndex,
    PrimaryIndexWithSelfHeal,
    SubstringFallback,
    AllDocuments,
    Unavailable,
}

impl Mechanism {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mechanism::PrimaryIndex => "primary-index",
            Mechanism::PrimaryIndexWithSelfHeal => "primary-index-with-self-heal",
            Mechanism::SubstringFallback => "substring-fallback",
            Mechanism::AllDocuments => "all-documents",
            Mechanism::Unavailable => "unavailable",
        }
    }

    /// True for mechanisms ordered by relevance score rather than recency.
    pub fn is_relevance(&self) -> bool {
        matches!(
            self,
            Mechanism::PrimaryIndex | Mechanism::PrimaryIndexWithSelfHeal
        )
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordering key of a result row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Rank {
    /// Relevance score; lower is better.
    Score(f64),
    /// `updated_at` in unix seconds; higher is more recent.
    Recency(i64),
}

impl Rank {
    pub fn score(&self) -> Option<f64> {
        match self {
            Rank::Score(s) => Some(*s),
            Rank::Recency(_) => None,
        }
    }
}

/// One strongly-typed search result row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub document_id: String,
    pub year: Option<i32>,
    pub filename: String,
    pub source_path: Option<String>,
    /// Stored snippet source for this row.
    pub excerpt: String,
    pub status: NoteStatus,
    pub status_note: Option<String>,
    pub updated_at: i64,
    pub rank: Rank,
    pub mechanism: Mechanism,
}

/// Builds the stored excerpt: the first `max_chars` characters of the
/// whitespace-collapsed text.
pub fn make_excerpt(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(max_chars) {
        Some((cut, _)) => collapsed[..cut].to_string(),
        None => collapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parses_labels_and_names() {
        assert_eq!("Vigente".parse::<NoteStatus>().unwrap(), NoteStatus::InForce);
        assert_eq!("in_force".parse::<NoteStatus>().unwrap(), NoteStatus::InForce);
        assert_eq!(
            "PARCIALMENTE REVOGADA".parse::<NoteStatus>().unwrap(),
            NoteStatus::PartiallyRevoked
        );
        assert_eq!("revogada".parse::<NoteStatus>().unwrap(), NoteStatus::Revoked);
        assert!("cancelada".parse::<NoteStatus>().is_err());
    }

    #[test]
    fn test_mechanism_serializes_kebab_case() {
        let json = serde_json::to_string(&Mechanism::PrimaryIndexWithSelfHeal).unwrap();
        assert_eq!(json, "\"primary-index-with-self-heal\"");
        assert_eq!(Mechanism::SubstringFallback.to_string(), "substring-fallback");
        assert!(Mechanism::PrimaryIndex.is_relevance());
        assert!(!Mechanism::AllDocuments.is_relevance());
    }

    #[test]
    fn test_rank_json_shape() {
        let json = serde_json::to_value(Rank::Recency(42)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "recency", "value": 42}));
        assert_eq!(Rank::Score(-1.5).score(), Some(-1.5));
    }

    #[test]
    fn test_make_excerpt() {
        assert_eq!(make_excerpt("  a\n\nb   c ", 10), "a b c");
        assert_eq!(make_excerpt("ação técnica", 4), "ação");
        assert_eq!(make_excerpt("", 4), "");
    }
}
