//! Database statistics and health overview.
//!
//! Summarizes what is stored: document counts per year and status, how the
//! relevance index lines up with the documents, and the blocklist size.
//! Used by `nv stats`.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use note_vault_core::ranking::year_label;
use note_vault_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Serialize)]
pub struct YearStats {
    pub year: Option<i32>,
    pub documents: i64,
    pub in_force: i64,
    pub revoked: i64,
    pub last_update: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub documents: i64,
    pub index_entries: i64,
    pub orphaned_entries: i64,
    pub unindexed_documents: i64,
    pub has_relevance_index: bool,
    pub terms_total: i64,
    pub terms_enabled: i64,
    pub by_year: Vec<YearStats>,
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<Stats> {
    let store = SqliteStore::new(pool.clone());

    let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(pool)
        .await?;

    let has_relevance_index = store.has_relevance_index().await?;
    let (index_entries, orphaned_entries, unindexed_documents) = if has_relevance_index {
        let entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents_fts")
            .fetch_one(pool)
            .await?;
        let unindexed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM documents WHERE id NOT IN (SELECT document_id FROM documents_fts)",
        )
        .fetch_one(pool)
        .await?;
        (entries, store.orphan_count().await? as i64, unindexed)
    } else {
        (0, 0, documents)
    };

    let terms_total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blocklist_terms")
        .fetch_one(pool)
        .await?;
    let terms_enabled: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM blocklist_terms WHERE enabled = 1")
            .fetch_one(pool)
            .await?;

    let year_rows = sqlx::query(
        r#"
        SELECT
            year,
            COUNT(*) AS documents,
            SUM(CASE WHEN status = 'in_force' THEN 1 ELSE 0 END) AS in_force,
            SUM(CASE WHEN status = 'revoked' THEN 1 ELSE 0 END) AS revoked,
            MAX(updated_at) AS last_update
        FROM documents
        GROUP BY year
        ORDER BY year IS NULL, year DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let by_year = year_rows
        .iter()
        .map(|row| YearStats {
            year: row.get("year"),
            documents: row.get("documents"),
            in_force: row.get("in_force"),
            revoked: row.get("revoked"),
            last_update: row.get("last_update"),
        })
        .collect();

    Ok(Stats {
        documents,
        index_entries,
        orphaned_entries,
        unindexed_documents,
        has_relevance_index,
        terms_total,
        terms_enabled,
        by_year,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let Some(pool) = db::open_existing(config).await? else {
        println!("No database at {}. Run `nv init`.", config.db.path.display());
        return Ok(());
    };
    crate::migrate::apply_schema(&pool).await?;
    let stats = collect_stats(&pool).await?;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Note Vault — Database Stats");
    println!("===========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", stats.documents);
    if stats.has_relevance_index {
        println!("  Indexed:     {}", stats.index_entries);
        if stats.orphaned_entries > 0 || stats.unindexed_documents > 0 {
            println!(
                "  Drift:       {} orphaned, {} unindexed (run `nv reindex`)",
                stats.orphaned_entries, stats.unindexed_documents
            );
        }
    } else {
        println!("  Indexed:     no relevance index (run `nv reindex`)");
    }
    println!(
        "  Blocklist:   {} enabled / {} terms",
        stats.terms_enabled, stats.terms_total
    );

    if !stats.by_year.is_empty() {
        println!();
        println!("  By year:");
        println!(
            "  {:<10} {:>6} {:>9} {:>8}   {}",
            "YEAR", "DOCS", "IN FORCE", "REVOKED", "LAST UPDATE"
        );
        println!("  {}", "-".repeat(54));
        for y in &stats.by_year {
            let updated = match y.last_update {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<10} {:>6} {:>9} {:>8}   {}",
                year_label(y.year),
                y.documents,
                y.in_force,
                y.revoked,
                updated
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 days ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        format_ts_date(ts)
    } else if delta < 3600 {
        "within the hour".to_string()
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_date(ts)
    }
}

fn format_ts_date(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_format_ts_relative() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now - 10), "within the hour");
        assert_eq!(format_ts_relative(now - 2 * 86400 - 5), "2 days ago");
        assert_eq!(format_ts_relative(0), "1970-01-01");
    }
}
