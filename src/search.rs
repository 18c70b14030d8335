use anyhow::Result;

use note_vault_core::ranking::{compose, ResultPage};
use note_vault_core::search::{search, SearchQuery, SearchRequest};
use note_vault_core::store::Window;

use crate::config::Config;
use crate::db;
use crate::library::FsPageSource;
use crate::sqlite_store::SqliteStore;
use crate::terms;

#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub query: String,
    pub year: Option<i32>,
    pub offset: usize,
    pub limit: Option<usize>,
    /// List every document regardless of the query text.
    pub all: bool,
}

/// Runs a search against the configured database and composes the page.
///
/// Never fails because the database is missing or broken: that yields an
/// empty page whose mechanism is `unavailable`.
pub async fn search_page(config: &Config, params: &SearchParams) -> Result<ResultPage> {
    let pool = match db::open_existing(config).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(error = %e, "could not open database");
            None
        }
    };
    let store = pool.map(SqliteStore::new);

    let page = search_with(config, store.as_ref(), params).await;

    if let Some(s) = store {
        s.pool().close().await;
    }
    Ok(page)
}

/// Runs a search over an already opened store (or none at all).
pub async fn search_with(
    config: &Config,
    store: Option<&SqliteStore>,
    params: &SearchParams,
) -> ResultPage {
    let redactor = match store {
        Some(s) => match terms::load_redactor(s.pool(), config).await {
            Ok(r) => Some(r),
            Err(e) => {
                tracing::warn!(error = %e, "could not load blocklist");
                None
            }
        },
        None => None,
    };

    let query = if params.all {
        SearchQuery::All
    } else {
        SearchQuery::from_input(&params.query, config.search.list_all_on_empty)
    };
    let request = SearchRequest {
        query,
        year: params.year,
        window: Window::new(
            params.offset,
            params.limit.unwrap_or(config.search.page_size).max(1),
        ),
    };

    let outcome = search(store, &request).await;
    tracing::info!(
        mechanism = %outcome.mechanism,
        total = outcome.total,
        orphans_removed = outcome.orphans_removed,
        "search"
    );

    compose(
        outcome,
        &FsPageSource::new(&config.library),
        redactor.as_ref(),
        &config.compose_options(),
    )
}

pub async fn run_search(config: &Config, params: &SearchParams, json: bool) -> Result<()> {
    let page = search_page(config, params).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    print_page(&page);
    Ok(())
}

fn print_page(page: &ResultPage) {
    let p = &page.pagination;
    println!(
        "mechanism: {}  total: {}  page {}/{}",
        page.mechanism,
        page.total,
        p.page,
        p.page_count.max(1)
    );
    if page.orphans_removed > 0 {
        println!("  (removed {} stale index entries)", page.orphans_removed);
    }
    if let Some(reason) = &page.degraded {
        println!("  (degraded: {})", reason);
    }

    if page.groups.is_empty() {
        println!();
        println!("No results.");
        return;
    }

    let mut n = p.offset;
    for group in &page.groups {
        println!();
        println!("== {} ==", group.label);
        for item in &group.items {
            n += 1;
            println!("{}. {} [{}]", n, item.title, item.status_label);
            if let Some(note) = &item.status_note {
                println!("    status note: {}", note);
            }
            println!("    file: {}", item.filename);
            println!("    updated: {}", item.updated_at);
            println!("    excerpt: \"{}\"", item.excerpt.replace('\n', " ").trim());
            println!("    id: {}", item.document_id);
        }
    }

    if let Some(next) = p.next_offset {
        println!();
        println!("More results: --offset {}", next);
    }
}
