//! Blocklist term management.
//!
//! Terms are grouped by category and unique per `(category, normalized)`,
//! so re-importing a list only adds what is new. Two import formats are
//! accepted:
//!
//! ```toml
//! # terms.toml
//! [categories]
//! nomes = ["Ana Silva", "João Pereira"]
//! cpfs = ["123.456.789-00"]
//! ```
//!
//! or a plain text file with one term per line (`#` starts a comment),
//! imported under a category given on the command line.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::Path;

use note_vault_core::models::BlocklistTerm;
use note_vault_core::normalize::normalize_term;
use note_vault_core::redact::{Blocklist, Redactor};

use crate::config::Config;
use crate::migrate;

#[derive(Debug, Deserialize)]
struct TermFile {
    #[serde(default)]
    categories: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub added: usize,
    pub updated: usize,
    /// Terms that normalize to nothing and can never match.
    pub skipped: usize,
}

/// Reads `(category, term)` pairs from a TOML or plain text file.
pub fn read_term_file(path: &Path, category: Option<&str>) -> Result<Vec<(String, String)>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read term file: {}", path.display()))?;

    let is_toml = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);

    if is_toml {
        let file: TermFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse term file: {}", path.display()))?;
        let mut pairs = Vec::new();
        for (cat, terms) in file.categories {
            if let Some(only) = category {
                if only != cat {
                    continue;
                }
            }
            pairs.extend(terms.into_iter().map(|t| (cat.clone(), t)));
        }
        return Ok(pairs);
    }

    let category = match category {
        Some(c) if !c.trim().is_empty() => c.trim().to_string(),
        _ => bail!("--category is required when importing a plain text term list"),
    };
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| (category.clone(), l.to_string()))
        .collect())
}

pub async fn import_terms(pool: &SqlitePool, pairs: &[(String, String)]) -> Result<ImportReport> {
    let now = chrono::Utc::now().timestamp();
    let mut report = ImportReport::default();
    let mut tx = pool.begin().await?;

    for (category, term) in pairs {
        let term = term.trim();
        let normalized = normalize_term(term);
        if normalized.is_empty() {
            report.skipped += 1;
            continue;
        }
        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM blocklist_terms WHERE category = ? AND normalized = ?",
        )
        .bind(category)
        .bind(&normalized)
        .fetch_one(&mut *tx)
        .await?;

        // the enabled flag of an existing term is left alone
        sqlx::query(
            r#"
            INSERT INTO blocklist_terms (category, term, normalized, enabled, created_at)
            VALUES (?, ?, ?, 1, ?)
            ON CONFLICT(category, normalized) DO UPDATE SET
                term = excluded.term
            "#,
        )
        .bind(category)
        .bind(term)
        .bind(&normalized)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if exists {
            report.updated += 1;
        } else {
            report.added += 1;
        }
    }

    tx.commit().await?;
    Ok(report)
}

pub async fn list_terms(pool: &SqlitePool, category: Option<&str>) -> Result<Vec<BlocklistTerm>> {
    let rows = sqlx::query(
        "SELECT id, category, term, normalized, enabled FROM blocklist_terms \
         WHERE (? IS NULL OR category = ?) ORDER BY category ASC, normalized ASC",
    )
    .bind(category)
    .bind(category)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| BlocklistTerm {
            id: row.get("id"),
            category: row.get("category"),
            term: row.get("term"),
            normalized_form: row.get("normalized"),
            enabled: row.get::<i64, _>("enabled") != 0,
        })
        .collect())
}

pub async fn set_enabled(pool: &SqlitePool, id: i64, enabled: bool) -> Result<bool> {
    let result = sqlx::query("UPDATE blocklist_terms SET enabled = ? WHERE id = ?")
        .bind(enabled as i64)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_term(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM blocklist_terms WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Builds the active blocklist from every enabled term.
pub async fn load_blocklist(pool: &SqlitePool) -> Result<Blocklist> {
    let terms: Vec<String> =
        sqlx::query_scalar("SELECT term FROM blocklist_terms WHERE enabled = 1 ORDER BY id")
            .fetch_all(pool)
            .await?;
    let blocklist = Blocklist::from_terms(&terms);
    tracing::debug!(terms = blocklist.len(), "loaded blocklist");
    Ok(blocklist)
}

pub async fn load_redactor(pool: &SqlitePool, config: &Config) -> Result<Redactor> {
    Ok(Redactor::new(
        load_blocklist(pool).await?,
        config.redaction.marker.clone(),
    ))
}

// ============ CLI entry points ============

pub async fn run_import(config: &Config, path: &Path, category: Option<&str>) -> Result<()> {
    let pairs = read_term_file(path, category)?;
    let pool = migrate::open_migrated(config).await?;
    let report = import_terms(&pool, &pairs).await?;
    pool.close().await;

    println!("Imported terms from {}", path.display());
    println!("  added:    {}", report.added);
    println!("  updated:  {}", report.updated);
    if report.skipped > 0 {
        println!("  skipped:  {} (empty after normalization)", report.skipped);
    }
    println!();
    println!("Run `nv resanitize` to apply new terms to stored documents.");
    Ok(())
}

pub async fn run_list(config: &Config, category: Option<&str>) -> Result<()> {
    let pool = migrate::open_migrated(config).await?;
    let terms = list_terms(&pool, category).await?;
    pool.close().await;

    if terms.is_empty() {
        println!("No blocklist terms.");
        return Ok(());
    }

    println!("{:<6} {:<16} {:<8} TERM", "ID", "CATEGORY", "ENABLED");
    for t in &terms {
        println!(
            "{:<6} {:<16} {:<8} {}",
            t.id,
            t.category,
            if t.enabled { "yes" } else { "no" },
            t.term
        );
    }
    println!();
    println!("{} term(s)", terms.len());
    Ok(())
}

pub async fn run_set_enabled(config: &Config, id: i64, enabled: bool) -> Result<()> {
    let pool = migrate::open_migrated(config).await?;
    let found = set_enabled(&pool, id, enabled).await?;
    pool.close().await;

    if !found {
        bail!("blocklist term not found: {}", id);
    }
    println!("Term {} {}.", id, if enabled { "enabled" } else { "disabled" });
    Ok(())
}

pub async fn run_delete(config: &Config, id: i64) -> Result<()> {
    let pool = migrate::open_migrated(config).await?;
    let found = delete_term(&pool, id).await?;
    pool.close().await;

    if !found {
        bail!("blocklist term not found: {}", id);
    }
    println!("Term {} deleted.", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_read_toml_categories() {
        let file = write_temp(
            ".toml",
            "[categories]\nnomes = [\"Ana Silva\"]\ncpfs = [\"123.456.789-00\", \"987\"]\n",
        );
        let pairs = read_term_file(file.path(), None).unwrap();
        assert_eq!(pairs.len(), 3);
        assert!(pairs.contains(&("nomes".to_string(), "Ana Silva".to_string())));

        let only = read_term_file(file.path(), Some("cpfs")).unwrap();
        assert_eq!(only.len(), 2);
    }

    #[test]
    fn test_read_plain_text_requires_category() {
        let file = write_temp(".txt", "# nomes\nAna Silva\n\n  João  \n");
        assert!(read_term_file(file.path(), None).is_err());

        let pairs = read_term_file(file.path(), Some("nomes")).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("nomes".to_string(), "Ana Silva".to_string()),
                ("nomes".to_string(), "João".to_string()),
            ]
        );
    }
}
