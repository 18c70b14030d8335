//! Maintenance commands: `init`, `reindex`, `resanitize` and `redact`.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Read;
use std::path::Path;

use note_vault_core::models::make_excerpt;
use note_vault_core::redact::Redactor;
use note_vault_core::store::Store;

use crate::config::Config;
use crate::extract;
use crate::migrate;
use crate::sqlite_store::SqliteStore;
use crate::terms;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ResanitizeReport {
    pub checked: usize,
    pub changed: usize,
}

/// Recomputes sanitized text and excerpt of every document with the
/// current blocklist. Documents whose text does not change are not
/// rewritten.
pub async fn resanitize(
    store: &SqliteStore,
    redactor: &Redactor,
    excerpt_chars: usize,
) -> Result<ResanitizeReport> {
    let mut report = ResanitizeReport::default();
    for mut doc in store.all_documents().await? {
        report.checked += 1;
        let sanitized = redactor.redact(&doc.original_text);
        if sanitized == doc.sanitized_text {
            continue;
        }
        doc.excerpt = make_excerpt(&sanitized, excerpt_chars);
        doc.sanitized_text = sanitized;
        doc.updated_at = chrono::Utc::now().timestamp();
        store.upsert_document(&doc).await?;
        report.changed += 1;
        tracing::debug!(id = %doc.id, "resanitized");
    }
    Ok(report)
}

pub async fn run_init(config: &Config) -> Result<()> {
    migrate::run_migrations(config).await?;
    println!("Database initialized at {}", config.db.path.display());
    Ok(())
}

pub async fn run_reindex(config: &Config, rebuild: bool) -> Result<()> {
    let pool = migrate::open_migrated(config).await?;
    let store = SqliteStore::new(pool);

    if rebuild {
        let indexed = store.rebuild_relevance_index().await?;
        store.pool().close().await;
        tracing::info!(indexed, "relevance index rebuilt");
        println!("reindex (rebuild)");
        println!("  indexed: {}", indexed);
        println!("ok");
        return Ok(());
    }

    let (added, removed) = store.repair_relevance_index().await?;
    store.pool().close().await;
    tracing::info!(added, removed, "relevance index repaired");
    println!("reindex");
    println!("  added:   {}", added);
    println!("  removed: {}", removed);
    println!("ok");
    Ok(())
}

pub async fn run_resanitize(config: &Config) -> Result<()> {
    let pool = migrate::open_migrated(config).await?;
    let redactor = terms::load_redactor(&pool, config).await?;
    let store = SqliteStore::new(pool);
    let report = resanitize(&store, &redactor, config.search.excerpt_chars).await?;
    store.pool().close().await;

    println!("resanitize");
    println!("  checked: {}", report.checked);
    println!("  changed: {}", report.changed);
    println!("ok");
    Ok(())
}

/// Prints the sanitized text of a file, or of stdin when `input` is `-`.
pub async fn run_redact(config: &Config, input: &Path) -> Result<()> {
    let text = if input == Path::new("-") {
        let mut bytes = Vec::new();
        std::io::stdin()
            .read_to_end(&mut bytes)
            .context("Failed to read stdin")?;
        extract::decode_text(&bytes)
    } else {
        let bytes = std::fs::read(input)
            .with_context(|| format!("Failed to read {}", input.display()))?;
        match extract::content_type_for(input) {
            Some(ct) => extract::extract_text(&bytes, ct)
                .with_context(|| format!("Failed to extract {}", input.display()))?,
            None => extract::decode_text(&bytes),
        }
    };

    let pool = migrate::open_migrated(config).await?;
    let redactor = terms::load_redactor(&pool, config).await?;
    pool.close().await;

    print!("{}", redactor.redact(&text));
    if !text.ends_with('\n') {
        println!();
    }
    Ok(())
}
