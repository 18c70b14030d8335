//! # Note Vault
//!
//! A local repository of technical notes. Source files (PDF and text) are
//! ingested into SQLite with blocklisted terms redacted, and searched
//! through a tiered coordinator: ranked full-text first, a self-healing
//! retry when the index has drifted, and a substring fallback when the
//! index finds nothing.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//! │  Library    │──▶│ Extract +    │──▶│  SQLite   │
//! │  PDF / TXT  │   │ Redact       │   │ docs+FTS5 │
//! └─────────────┘   └──────────────┘   └─────┬─────┘
//!                                            │
//!                        ┌───────────────────┤
//!                        ▼                   ▼
//!                   ┌──────────┐       ┌──────────┐
//!                   │   CLI    │       │   HTTP   │
//!                   │   (nv)   │       │  (axum)  │
//!                   └──────────┘       └──────────┘
//! ```
//!
//! Pure logic (normalization, redaction, the search state machine, snippets
//! and ranking) lives in the `note-vault-core` crate.
//!
//! ## Quick Start
//!
//! ```bash
//! nv init
//! nv terms import terms.toml
//! nv ingest ./NOTAS
//! nv search "aposentadoria rural" --year 2024
//! nv serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the core `Store` trait |
//! | [`terms`] | Blocklist import and management |
//! | [`extract`] | PDF and text extraction |
//! | [`library`] | Locating source files on disk |
//! | [`ingest`] | Ingestion pipeline |
//! | [`search`] | Search entry point and result printing |
//! | [`documents`] | Document get, edit and delete |
//! | [`maintenance`] | Reindex, resanitize and ad-hoc redaction |
//! | [`stats`] | Database statistics |
//! | [`server`] | HTTP server |

pub mod config;
pub mod db;
pub mod documents;
pub mod extract;
pub mod ingest;
pub mod library;
pub mod maintenance;
pub mod migrate;
pub mod search;
pub mod server;
pub mod sqlite_store;
pub mod stats;
pub mod terms;
