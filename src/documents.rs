//! Document retrieval and editing by ID.
//!
//! Used by `nv get`, `nv edit`, `nv delete` and `GET /documents/{id}`.
//! The view is sanitized; the original text is only included on request.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::PathBuf;

use note_vault_core::models::{make_excerpt, Document, NoteStatus};
use note_vault_core::ranking::{format_ts_iso, note_title};
use note_vault_core::redact::Redactor;
use note_vault_core::store::Store;

use crate::config::Config;
use crate::extract;
use crate::library;
use crate::migrate;
use crate::sqlite_store::SqliteStore;
use crate::terms;

#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    pub id: String,
    pub title: String,
    pub filename: String,
    pub year: Option<i32>,
    pub status: NoteStatus,
    pub status_label: &'static str,
    pub status_note: Option<String>,
    pub source_path: Option<String>,
    pub created_at: String, // ISO8601
    pub updated_at: String, // ISO8601
    pub excerpt: String,
    pub sanitized_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
}

impl DocumentView {
    pub fn from_document(doc: Document, include_original: bool) -> Self {
        Self {
            title: note_title(&doc.filename, &doc.sanitized_text),
            status_label: doc.status.label(),
            created_at: format_ts_iso(doc.created_at),
            updated_at: format_ts_iso(doc.updated_at),
            original_text: include_original.then_some(doc.original_text),
            id: doc.id,
            filename: doc.filename,
            year: doc.year,
            status: doc.status,
            status_note: doc.status_note,
            source_path: doc.source_path,
            excerpt: doc.excerpt,
            sanitized_text: doc.sanitized_text,
        }
    }
}

/// Field changes for one document. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct DocumentEdit {
    /// Replaces the original text; sanitized text and excerpt follow.
    pub text: Option<String>,
    pub year: Option<i32>,
    pub status: Option<NoteStatus>,
    pub status_note: Option<String>,
    pub excerpt: Option<String>,
}

impl DocumentEdit {
    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.year.is_none()
            && self.status.is_none()
            && self.status_note.is_none()
            && self.excerpt.is_none()
    }
}

/// Applies an edit and stores the result. Returns `None` when the document
/// does not exist.
pub async fn apply_edit<S: Store + ?Sized>(
    store: &S,
    redactor: &Redactor,
    id: &str,
    edit: &DocumentEdit,
    excerpt_chars: usize,
) -> Result<Option<Document>> {
    let Some(mut doc) = store.get_document(id).await? else {
        return Ok(None);
    };

    if let Some(text) = &edit.text {
        doc.original_text = text.clone();
        doc.sanitized_text = redactor.redact(text);
        doc.excerpt = make_excerpt(&doc.sanitized_text, excerpt_chars);
    }
    if let Some(excerpt) = &edit.excerpt {
        doc.excerpt = redactor.redact(excerpt.trim());
    }
    if let Some(year) = edit.year {
        doc.year = Some(year);
    }
    if let Some(status) = edit.status {
        doc.status = status;
    }
    if let Some(note) = &edit.status_note {
        let note = note.trim();
        doc.status_note = (!note.is_empty()).then(|| note.to_string());
    }
    doc.updated_at = chrono::Utc::now().timestamp();

    store.upsert_document(&doc).await?;
    Ok(Some(doc))
}

// ============ CLI entry points ============

pub async fn run_get(config: &Config, id: &str, original: bool, json: bool) -> Result<()> {
    let pool = migrate::open_migrated(config).await?;
    let store = SqliteStore::new(pool);
    let doc = store.get_document(id).await?;
    store.pool().close().await;

    let Some(doc) = doc else {
        bail!("document not found: {}", id);
    };

    let source = library::resolve_path(
        &config.library,
        doc.source_path.as_deref(),
        &doc.filename,
        doc.year,
    );
    let view = DocumentView::from_document(doc, original);

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("--- Document ---");
    println!("id:       {}", view.id);
    println!("title:    {}", view.title);
    println!("file:     {}", view.filename);
    println!(
        "year:     {}",
        view.year.map(|y| y.to_string()).unwrap_or_else(|| "-".to_string())
    );
    println!("status:   {}", view.status_label);
    if let Some(note) = &view.status_note {
        println!("note:     {}", note);
    }
    println!("created:  {}", view.created_at);
    println!("updated:  {}", view.updated_at);
    match source {
        Some(path) => match extract::extract_file_pages(&path) {
            Ok(pages) => println!("source:   {} ({} page(s))", path.display(), pages.len()),
            Err(e) => println!("source:   {}", extract::failure_placeholder(&e)),
        },
        None => println!("source:   (not found)"),
    }
    println!();
    println!("--- Excerpt ---");
    println!("{}", view.excerpt);
    println!();
    println!("--- Text (sanitized) ---");
    println!("{}", view.sanitized_text);
    if let Some(text) = &view.original_text {
        println!();
        println!("--- Text (original) ---");
        println!("{}", text);
    }

    Ok(())
}

pub async fn run_edit(
    config: &Config,
    id: &str,
    text_file: Option<PathBuf>,
    mut edit: DocumentEdit,
) -> Result<()> {
    if let Some(path) = text_file {
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read text file: {}", path.display()))?;
        edit.text = Some(extract::decode_text(&bytes));
    }
    if edit.is_empty() {
        bail!("nothing to edit: pass --text-file, --year, --status, --status-note or --excerpt");
    }

    let pool = migrate::open_migrated(config).await?;
    let redactor = terms::load_redactor(&pool, config).await?;
    let store = SqliteStore::new(pool);
    let updated = apply_edit(&store, &redactor, id, &edit, config.search.excerpt_chars).await?;
    store.pool().close().await;

    match updated {
        Some(doc) => {
            println!("Updated {} ({}).", doc.id, doc.filename);
            Ok(())
        }
        None => bail!("document not found: {}", id),
    }
}

pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let pool = migrate::open_migrated(config).await?;
    let store = SqliteStore::new(pool);
    let removed = store.delete_document(id).await?;
    store.pool().close().await;

    if !removed {
        bail!("document not found: {}", id);
    }
    println!("Deleted {}.", id);
    Ok(())
}
