//! Ingestion pipeline.
//!
//! Scans the library (or a single file), extracts text, redacts it with the
//! active blocklist and upserts one document per file. Documents are keyed
//! by the SHA-256 of the file bytes, so re-ingesting is idempotent.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use note_vault_core::models::{make_excerpt, Document, NoteStatus, UpsertOutcome};
use note_vault_core::redact::Redactor;
use note_vault_core::store::Store;

use crate::config::Config;
use crate::extract::{self, ExtractError};
use crate::migrate;
use crate::sqlite_store::SqliteStore;
use crate::terms;

static YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(19|20)\d{2}").expect("year pattern is valid"));

const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2100;

#[derive(Debug, Default, Serialize)]
pub struct IngestReport {
    pub scanned: usize,
    pub inserted: usize,
    pub updated: usize,
    pub failed: Vec<(String, String)>,
}

/// First plausible year in a file name, else in its parent directory name.
pub fn detect_year(path: &Path) -> Option<i32> {
    let from = |s: &str| {
        YEAR_RE
            .find(s)
            .and_then(|m| m.as_str().parse::<i32>().ok())
            .filter(|y| (MIN_YEAR..=MAX_YEAR).contains(y))
    };
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(from)
        .or_else(|| {
            path.parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .and_then(from)
        })
}

/// Lowercase hex SHA-256 of the file bytes.
pub fn document_id(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Files under `root` matching the include globs, in path order.
pub fn scan_files(root: &Path, include_globs: &[String]) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        bail!("Library root does not exist: {}", root.display());
    }
    let include_set = build_globset(include_globs)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if include_set.is_match(relative) && extract::content_type_for(path).is_some() {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// Builds a sanitized document from raw file bytes.
pub fn build_document(
    path: &Path,
    bytes: &[u8],
    redactor: &Redactor,
    excerpt_chars: usize,
    now: i64,
) -> Result<Document, ExtractError> {
    let content_type = extract::content_type_for(path)
        .ok_or_else(|| ExtractError::UnsupportedContentType(path.display().to_string()))?;
    let original_text = extract::extract_text(bytes, content_type)?;
    let sanitized_text = redactor.redact(&original_text);

    Ok(Document {
        id: document_id(bytes),
        year: detect_year(path),
        filename: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        source_path: Some(path.display().to_string()),
        excerpt: make_excerpt(&sanitized_text, excerpt_chars),
        original_text,
        sanitized_text,
        status: NoteStatus::InForce,
        status_note: None,
        created_at: now,
        updated_at: now,
    })
}

/// Per-run overrides applied to every ingested file.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub excerpt_chars: usize,
    /// Overrides the year detected from the path.
    pub year: Option<i32>,
    /// Overrides the status; otherwise an existing document keeps its own.
    pub status: Option<NoteStatus>,
}

impl IngestOptions {
    pub fn new(excerpt_chars: usize) -> Self {
        Self {
            excerpt_chars,
            year: None,
            status: None,
        }
    }
}

pub async fn ingest_paths<S: Store + ?Sized>(
    store: &S,
    paths: &[PathBuf],
    redactor: &Redactor,
    opts: &IngestOptions,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    let now = chrono::Utc::now().timestamp();

    for path in paths {
        report.scanned += 1;
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
                report.failed.push((path.display().to_string(), e.to_string()));
                continue;
            }
        };
        let mut doc = match build_document(path, &bytes, redactor, opts.excerpt_chars, now) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping file");
                report.failed.push((path.display().to_string(), e.to_string()));
                continue;
            }
        };

        if opts.year.is_some() {
            doc.year = opts.year;
        }
        match (opts.status, store.get_document(&doc.id).await?) {
            (Some(status), _) => doc.status = status,
            // status edits survive re-ingestion
            (None, Some(existing)) => {
                doc.status = existing.status;
                doc.status_note = existing.status_note;
            }
            (None, None) => {}
        }

        match store.upsert_document(&doc).await? {
            UpsertOutcome::Inserted => report.inserted += 1,
            UpsertOutcome::Updated => report.updated += 1,
        }
        tracing::debug!(id = %doc.id, filename = %doc.filename, year = ?doc.year, "ingested");
    }

    Ok(report)
}

/// Expands targets into files: a file is taken as is, a directory is scanned.
pub fn collect_paths(targets: &[PathBuf], include_globs: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for target in targets {
        if target.is_file() {
            paths.push(target.clone());
        } else {
            paths.extend(scan_files(target, include_globs)?);
        }
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}

pub async fn run_ingest(
    config: &Config,
    targets: &[PathBuf],
    opts: &IngestOptions,
    dry_run: bool,
) -> Result<()> {
    let targets = if targets.is_empty() {
        vec![config.library.root.clone()]
    } else {
        targets.to_vec()
    };
    let paths = collect_paths(&targets, &config.library.include_globs)?;

    if dry_run {
        println!("ingest (dry-run)");
        println!("  files found: {}", paths.len());
        for p in &paths {
            let year = opts
                .year
                .or_else(|| detect_year(p))
                .map(|y| y.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("  [{}] {}", year, p.display());
        }
        return Ok(());
    }

    let pool = migrate::open_migrated(config).await?;
    let redactor = terms::load_redactor(&pool, config).await?;
    let store = SqliteStore::new(pool);

    let report = ingest_paths(&store, &paths, &redactor, opts).await?;
    store.pool().close().await;

    println!("ingest");
    println!("  scanned:  {}", report.scanned);
    println!("  inserted: {}", report.inserted);
    println!("  updated:  {}", report.updated);
    println!("  skipped:  {}", report.failed.len());
    for (path, err) in &report.failed {
        println!("    {}: {}", path, err);
    }
    println!("ok");
    Ok(())
}
