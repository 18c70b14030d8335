use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::Config;

/// Opens the database, creating the file and its directory when missing.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    open(config, true).await
}

/// Opens an existing database. Returns `None` when the file does not exist,
/// so read paths can report the store as unavailable instead of creating it.
pub async fn open_existing(config: &Config) -> Result<Option<SqlitePool>> {
    if !config.db.path.exists() {
        tracing::warn!(path = %config.db.path.display(), "database file not found");
        return Ok(None);
    }
    open(config, false).await.map(Some)
}

async fn open(config: &Config, create: bool) -> Result<SqlitePool> {
    let db_path = &config.db.path;
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(create)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

    Ok(pool)
}
