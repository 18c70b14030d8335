//! SQLite-backed [`Store`] implementation.
//!
//! Documents live in `documents`; the relevance index is the FTS5 table
//! `documents_fts`, keyed by `document_id` but not constrained to it, so the
//! two can diverge and [`Store::heal_and_retry`] has something to repair.

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use note_vault_core::models::{Document, NoteStatus, UpsertOutcome};
use note_vault_core::store::{
    HealedPage, Hit, HitPage, RelevanceQuery, Store, StoreError, StoreResult, Window,
};

use crate::migrate;

const HIT_COLUMNS: &str =
    "d.id, d.year, d.filename, d.source_path, d.excerpt, d.status, d.status_note, d.updated_at";

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Every stored document, oldest first.
    pub async fn all_documents(&self) -> StoreResult<Vec<Document>> {
        let rows = sqlx::query("SELECT * FROM documents ORDER BY created_at ASC, id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(rows.iter().map(document_from_row).collect())
    }

    /// Index entries whose document no longer exists.
    pub async fn orphan_count(&self) -> StoreResult<usize> {
        if !self.has_relevance_index().await? {
            return Ok(0);
        }
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM documents_fts WHERE document_id NOT IN (SELECT id FROM documents)",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(n as usize)
    }

    /// Drops and recreates the relevance index from the stored sanitized
    /// text. Returns the number of documents indexed.
    pub async fn rebuild_relevance_index(&self) -> StoreResult<usize> {
        sqlx::query("DROP TABLE IF EXISTS documents_fts")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        migrate::create_relevance_index(&self.pool).await?;

        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let result = sqlx::query(
            "INSERT INTO documents_fts (content, document_id, year) \
             SELECT sanitized_text, id, year FROM documents",
        )
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;
        tx.commit().await.map_err(map_sqlx)?;

        Ok(result.rows_affected() as usize)
    }

    /// Adds index entries for documents that lack one and removes orphans,
    /// creating the index first if needed. Returns `(added, removed)`.
    pub async fn repair_relevance_index(&self) -> StoreResult<(usize, usize)> {
        migrate::create_relevance_index(&self.pool).await?;

        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let removed = sqlx::query(
            "DELETE FROM documents_fts WHERE document_id NOT IN (SELECT id FROM documents)",
        )
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?
        .rows_affected();
        let added = sqlx::query(
            "INSERT INTO documents_fts (content, document_id, year) \
             SELECT sanitized_text, id, year FROM documents \
             WHERE id NOT IN (SELECT document_id FROM documents_fts)",
        )
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?
        .rows_affected();
        tx.commit().await.map_err(map_sqlx)?;

        Ok((added as usize, removed as usize))
    }

    /// Shared by [`Store::substring_page`] and [`Store::all_page`].
    async fn recency_page(
        &self,
        needles: &[String],
        year: Option<i32>,
        window: Window,
    ) -> StoreResult<HitPage> {
        let mut filter = String::from("WHERE (? IS NULL OR d.year = ?)");
        for _ in needles {
            filter.push_str(" AND instr(d.excerpt_lower, ?) > 0");
        }

        let count_sql = format!("SELECT COUNT(*) FROM documents d {}", filter);
        let mut count = sqlx::query_scalar::<_, i64>(&count_sql).bind(year).bind(year);
        for needle in needles {
            count = count.bind(needle);
        }
        let total = count.fetch_one(&self.pool).await.map_err(map_sqlx)?;

        let page_sql = format!(
            "SELECT {} FROM documents d {} ORDER BY d.updated_at DESC, d.id ASC LIMIT ? OFFSET ?",
            HIT_COLUMNS, filter
        );
        let mut page = sqlx::query(&page_sql).bind(year).bind(year);
        for needle in needles {
            page = page.bind(needle);
        }
        let (limit, offset) = sql_window(window);
        let rows = page
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        Ok(HitPage::new(
            rows.iter().map(|r| hit_from_row(r, None)).collect(),
            total as usize,
        ))
    }
}

/// Ranked page over one connection, so the self-heal path can run it
/// inside its transaction.
async fn relevance(
    conn: &mut SqliteConnection,
    query: &RelevanceQuery,
    window: Window,
) -> StoreResult<HitPage> {
    let expression = match query.match_expression() {
        Some(expr) => expr,
        None => return Ok(HitPage::default()),
    };

    let (matches, total): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(d.id) \
         FROM documents_fts LEFT JOIN documents d ON d.id = documents_fts.document_id \
         WHERE documents_fts MATCH ?1 AND (?2 IS NULL OR documents_fts.year = ?2)",
    )
    .bind(&expression)
    .bind(query.year)
    .fetch_one(&mut *conn)
    .await
    .map_err(map_sqlx)?;

    let sql = format!(
        "SELECT {}, bm25(documents_fts) AS score \
         FROM documents_fts JOIN documents d ON d.id = documents_fts.document_id \
         WHERE documents_fts MATCH ?1 AND (?2 IS NULL OR documents_fts.year = ?2) \
         ORDER BY score ASC, d.id ASC \
         LIMIT ?3 OFFSET ?4",
        HIT_COLUMNS
    );
    let (limit, offset) = sql_window(window);
    let rows = sqlx::query(&sql)
        .bind(&expression)
        .bind(query.year)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx)?;

    Ok(HitPage {
        hits: rows
            .iter()
            .map(|r| {
                let score: f64 = r.get("score");
                hit_from_row(r, Some(score))
            })
            .collect(),
        total: total as usize,
        orphaned: (matches - total) as usize,
    })
}

/// `LIMIT`/`OFFSET` values. SQLite integers are signed, so anything past
/// `i64::MAX` is clamped rather than wrapped.
fn sql_window(window: Window) -> (i64, i64) {
    (
        i64::try_from(window.limit).unwrap_or(i64::MAX),
        i64::try_from(window.offset).unwrap_or(i64::MAX),
    )
}

async fn relevance_index_exists(conn: &mut SqliteConnection) -> StoreResult<bool> {
    sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='documents_fts'",
    )
    .fetch_one(conn)
    .await
    .map_err(map_sqlx)
}

fn parse_status(raw: &str) -> NoteStatus {
    raw.parse().unwrap_or_else(|_| {
        tracing::warn!(status = raw, "unknown status in database, treating as in force");
        NoteStatus::InForce
    })
}

fn hit_from_row(row: &SqliteRow, score: Option<f64>) -> Hit {
    let status: String = row.get("status");
    Hit {
        document_id: row.get("id"),
        year: row.get("year"),
        filename: row.get("filename"),
        source_path: row.get("source_path"),
        excerpt: row.get("excerpt"),
        status: parse_status(&status),
        status_note: row.get("status_note"),
        updated_at: row.get("updated_at"),
        score,
    }
}

fn document_from_row(row: &SqliteRow) -> Document {
    let status: String = row.get("status");
    Document {
        id: row.get("id"),
        year: row.get("year"),
        filename: row.get("filename"),
        source_path: row.get("source_path"),
        original_text: row.get("original_text"),
        sanitized_text: row.get("sanitized_text"),
        excerpt: row.get("excerpt"),
        status: parse_status(&status),
        status_note: row.get("status_note"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SQLITE_ERROR: i32 = 1;
const SQLITE_BUSY: i32 = 5;
const SQLITE_CANTOPEN: i32 = 14;

/// Classifies sqlx errors by SQLite result code. FTS5 reports a bad match
/// expression as a plain `SQLITE_ERROR`, so only that code looks at the
/// message.
fn map_sqlx(err: sqlx::Error) -> StoreError {
    if let Some(db) = err.as_database_error() {
        let message = db.message().to_string();
        // extended codes keep the primary code in the low byte
        let primary = db
            .code()
            .and_then(|c| c.parse::<i32>().ok())
            .map(|c| c & 0xff);
        match primary {
            Some(SQLITE_CANTOPEN) | Some(SQLITE_BUSY) => {
                return StoreError::Unavailable(message);
            }
            Some(SQLITE_ERROR) if is_malformed_match(&message) => {
                return StoreError::MalformedQuery(message);
            }
            _ => {}
        }
    }
    if matches!(
        err,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    ) {
        return StoreError::Unavailable(err.to_string());
    }
    StoreError::Backend(anyhow!(err))
}

fn is_malformed_match(message: &str) -> bool {
    message.starts_with("fts5: ") || message.contains("unterminated string")
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_document(&self, doc: &Document) -> StoreResult<UpsertOutcome> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT created_at FROM documents WHERE id = ?")
                .bind(&doc.id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx)?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, year, filename, source_path, original_text,
                                   sanitized_text, excerpt, excerpt_lower, status,
                                   status_note, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                year = excluded.year,
                filename = excluded.filename,
                source_path = excluded.source_path,
                original_text = excluded.original_text,
                sanitized_text = excluded.sanitized_text,
                excerpt = excluded.excerpt,
                excerpt_lower = excluded.excerpt_lower,
                status = excluded.status,
                status_note = excluded.status_note,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&doc.id)
        .bind(doc.year)
        .bind(&doc.filename)
        .bind(&doc.source_path)
        .bind(&doc.original_text)
        .bind(&doc.sanitized_text)
        .bind(&doc.excerpt)
        .bind(doc.excerpt.to_lowercase())
        .bind(doc.status.as_str())
        .bind(&doc.status_note)
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        if relevance_index_exists(&mut *tx).await? {
            sqlx::query("DELETE FROM documents_fts WHERE document_id = ?")
                .bind(&doc.id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
            sqlx::query("INSERT INTO documents_fts (content, document_id, year) VALUES (?, ?, ?)")
                .bind(&doc.sanitized_text)
                .bind(&doc.id)
                .bind(doc.year)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
        }

        tx.commit().await.map_err(map_sqlx)?;

        Ok(match existing {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        })
    }

    async fn get_document(&self, id: &str) -> StoreResult<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.as_ref().map(document_from_row))
    }

    async fn delete_document(&self, id: &str) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        if relevance_index_exists(&mut *tx).await? {
            sqlx::query("DELETE FROM documents_fts WHERE document_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
        }
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn has_relevance_index(&self) -> StoreResult<bool> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx)?;
        relevance_index_exists(&mut conn).await
    }

    async fn relevance_page(&self, query: &RelevanceQuery, window: Window) -> StoreResult<HitPage> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx)?;
        relevance(&mut conn, query, window).await
    }

    async fn heal_and_retry(
        &self,
        query: &RelevanceQuery,
        window: Window,
    ) -> StoreResult<HealedPage> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let removed = sqlx::query(
            "DELETE FROM documents_fts WHERE document_id NOT IN (SELECT id FROM documents)",
        )
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?
        .rows_affected();

        let page = relevance(&mut *tx, query, window).await?;
        tx.commit().await.map_err(map_sqlx)?;

        if removed > 0 {
            tracing::info!(removed, "removed orphaned relevance index entries");
        }

        Ok(HealedPage {
            page,
            orphans_removed: removed as usize,
        })
    }

    async fn substring_page(
        &self,
        tokens: &[String],
        year: Option<i32>,
        window: Window,
    ) -> StoreResult<HitPage> {
        if tokens.is_empty() {
            return Ok(HitPage::default());
        }
        let needles: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        self.recency_page(&needles, year, window).await
    }

    async fn all_page(&self, year: Option<i32>, window: Window) -> StoreResult<HitPage> {
        self.recency_page(&[], year, window).await
    }
}
