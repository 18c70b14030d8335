//! # Note Vault CLI (`nv`)
//!
//! ## Usage
//!
//! ```bash
//! nv --config ./config/nv.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `nv init` | Create the SQLite database and run schema migrations |
//! | `nv ingest [paths…]` | Extract, redact and store note files |
//! | `nv terms import <file>` | Import blocklist terms |
//! | `nv terms list` | List blocklist terms |
//! | `nv terms enable\|disable\|delete <id>` | Manage one term |
//! | `nv search "<query>"` | Tiered search, grouped by year |
//! | `nv redact <file\|->` | Print redacted text |
//! | `nv get <id>` | Show a stored note |
//! | `nv edit <id>` | Change a note's text, year, status or excerpt |
//! | `nv delete <id>` | Remove a note and its index entry |
//! | `nv reindex` | Repair or rebuild the full-text index |
//! | `nv resanitize` | Re-apply the blocklist to every note |
//! | `nv stats` | Database summary |
//! | `nv serve` | Start the HTTP server |

use anyhow::bail;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use note_vault::config::{self, Config};
use note_vault::documents::{self, DocumentEdit};
use note_vault::ingest::{self, IngestOptions};
use note_vault::search::{self, SearchParams};
use note_vault::{maintenance, server, stats, terms};
use note_vault_core::models::NoteStatus;

const DEFAULT_CONFIG: &str = "./config/nv.toml";

/// Note Vault CLI: a local repository of technical notes with blocklist
/// redaction and tiered full-text search.
#[derive(Parser)]
#[command(
    name = "nv",
    about = "Note Vault — technical notes with blocklist redaction and tiered search",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When the default file does not exist, built-in defaults are used.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest note files.
    ///
    /// Each path may be a file or a directory; directories are walked and
    /// filtered by `[library].include_globs`. Without paths, the library
    /// root is ingested.
    Ingest {
        paths: Vec<PathBuf>,

        /// Year for every ingested file, instead of detecting it from the name.
        #[arg(long)]
        year: Option<i32>,

        /// Status for every ingested file (e.g. "Vigente", "revoked").
        #[arg(long)]
        status: Option<NoteStatus>,

        /// List the files that would be ingested without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Manage blocklist terms.
    Terms {
        #[command(subcommand)]
        action: TermsAction,
    },

    /// Search notes.
    ///
    /// Prints the mechanism that answered the query (primary index, index
    /// with self-heal, substring fallback, all documents or unavailable).
    Search {
        /// Query text. Use `__ALL__` or `--all` to list every note.
        #[arg(default_value = "")]
        query: String,

        #[arg(long)]
        year: Option<i32>,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Results per page (defaults to `[search].page_size`).
        #[arg(long)]
        limit: Option<usize>,

        /// List every note, newest first.
        #[arg(long)]
        all: bool,

        #[arg(long)]
        json: bool,
    },

    /// Print the redacted text of a file, or of stdin with `-`.
    Redact { input: PathBuf },

    /// Show a stored note.
    Get {
        id: String,

        /// Also print the original, unredacted text.
        #[arg(long)]
        original: bool,

        #[arg(long)]
        json: bool,
    },

    /// Edit a stored note.
    Edit {
        id: String,

        /// Replace the note's text with the contents of this file.
        #[arg(long)]
        text_file: Option<PathBuf>,

        #[arg(long)]
        year: Option<i32>,

        #[arg(long)]
        status: Option<NoteStatus>,

        /// Free-text note on the status, e.g. the revoking act. Empty clears it.
        #[arg(long)]
        status_note: Option<String>,

        /// Replace the stored excerpt.
        #[arg(long)]
        excerpt: Option<String>,
    },

    /// Delete a stored note and its index entry.
    Delete { id: String },

    /// Add missing index entries and remove orphaned ones.
    Reindex {
        /// Drop and recreate the full-text index from scratch.
        #[arg(long)]
        rebuild: bool,
    },

    /// Re-apply the current blocklist to every stored note.
    Resanitize,

    /// Show database statistics.
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum TermsAction {
    /// Import terms from a TOML (`[categories]`) or plain text file.
    Import {
        file: PathBuf,

        /// Category for plain text files; filters TOML files.
        #[arg(long)]
        category: Option<String>,
    },

    /// List terms.
    List {
        #[arg(long)]
        category: Option<String>,
    },

    Enable { id: i64 },

    Disable { id: i64 },

    Delete { id: i64 },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn resolve_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        return config::load_config(path);
    }
    if path == Path::new(DEFAULT_CONFIG) {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::minimal());
    }
    bail!("Config file not found: {}", path.display())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = resolve_config(&cli.config)?;

    match cli.command {
        Commands::Init => maintenance::run_init(&cfg).await?,
        Commands::Ingest {
            paths,
            year,
            status,
            dry_run,
        } => {
            let opts = IngestOptions {
                excerpt_chars: cfg.search.excerpt_chars,
                year,
                status,
            };
            ingest::run_ingest(&cfg, &paths, &opts, dry_run).await?;
        }
        Commands::Terms { action } => match action {
            TermsAction::Import { file, category } => {
                terms::run_import(&cfg, &file, category.as_deref()).await?
            }
            TermsAction::List { category } => terms::run_list(&cfg, category.as_deref()).await?,
            TermsAction::Enable { id } => terms::run_set_enabled(&cfg, id, true).await?,
            TermsAction::Disable { id } => terms::run_set_enabled(&cfg, id, false).await?,
            TermsAction::Delete { id } => terms::run_delete(&cfg, id).await?,
        },
        Commands::Search {
            query,
            year,
            offset,
            limit,
            all,
            json,
        } => {
            if limit == Some(0) {
                bail!("--limit must be at least 1");
            }
            let params = SearchParams {
                query,
                year,
                offset,
                limit,
                all,
            };
            search::run_search(&cfg, &params, json).await?;
        }
        Commands::Redact { input } => maintenance::run_redact(&cfg, &input).await?,
        Commands::Get { id, original, json } => {
            documents::run_get(&cfg, &id, original, json).await?
        }
        Commands::Edit {
            id,
            text_file,
            year,
            status,
            status_note,
            excerpt,
        } => {
            let edit = DocumentEdit {
                text: None,
                year,
                status,
                status_note,
                excerpt,
            };
            documents::run_edit(&cfg, &id, text_file, edit).await?;
        }
        Commands::Delete { id } => documents::run_delete(&cfg, &id).await?,
        Commands::Reindex { rebuild } => maintenance::run_reindex(&cfg, rebuild).await?,
        Commands::Resanitize => maintenance::run_resanitize(&cfg).await?,
        Commands::Stats { json } => stats::run_stats(&cfg, json).await?,
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}
