use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Connects and brings the schema up to date, for commands that write.
pub async fn open_migrated(config: &Config) -> Result<SqlitePool> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    Ok(pool)
}

/// Creates every table and index that does not exist yet.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Create documents table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            year INTEGER,
            filename TEXT NOT NULL,
            source_path TEXT,
            original_text TEXT NOT NULL,
            sanitized_text TEXT NOT NULL,
            excerpt TEXT NOT NULL,
            excerpt_lower TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'in_force',
            status_note TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create blocklist table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS blocklist_terms (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category TEXT NOT NULL,
            term TEXT NOT NULL,
            normalized TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            UNIQUE(category, normalized)
        )
        "#,
    )
    .execute(pool)
    .await?;

    create_relevance_index(pool).await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_year ON documents(year)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_updated_at ON documents(updated_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_blocklist_enabled ON blocklist_terms(enabled)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Creates the FTS5 table over sanitized text. Returns `true` if it was created.
pub async fn create_relevance_index(pool: &SqlitePool) -> Result<bool> {
    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='documents_fts'",
    )
    .fetch_one(pool)
    .await?;

    if fts_exists {
        return Ok(false);
    }

    sqlx::query(
        r#"
        CREATE VIRTUAL TABLE documents_fts USING fts5(
            content,
            document_id UNINDEXED,
            year UNINDEXED,
            tokenize = 'unicode61 remove_diacritics 2'
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(true)
}
