//! TOML configuration.
//!
//! Every section has defaults, so an empty file is a valid configuration.
//! [`load_config`] parses and validates; [`Config::minimal`] is used by
//! commands that can run without a config file.
//!
//! ```toml
//! [db]
//! path = "./data/notes.sqlite"
//!
//! [library]
//! root = "./NOTAS"
//! preferred_dir = "NOTAS_REVISADAS"
//! legacy_dirs = ["NOTAS TÉCNICAS {year}"]
//!
//! [redaction]
//! marker = "[REMOVIDO]"
//! redact_on_display = true
//!
//! [search]
//! page_size = 20
//!
//! [server]
//! bind = "127.0.0.1:7340"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use note_vault_core::ranking::{ComposeOptions, DEFAULT_PLACEHOLDER};
use note_vault_core::redact::DEFAULT_MARKER;
use note_vault_core::snippet::{SnippetOptions, DEFAULT_WINDOW_WORDS};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub redaction: RedactionConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/notes.sqlite")
}

/// Where source files live on disk.
#[derive(Debug, Deserialize, Clone)]
pub struct LibraryConfig {
    #[serde(default = "default_library_root")]
    pub root: PathBuf,
    /// Directory under `root` searched first for a note's file.
    #[serde(default = "default_preferred_dir")]
    pub preferred_dir: String,
    /// Fallback directories under `root`; `{year}` expands to the note's year.
    #[serde(default = "default_legacy_dirs")]
    pub legacy_dirs: Vec<String>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: default_library_root(),
            preferred_dir: default_preferred_dir(),
            legacy_dirs: default_legacy_dirs(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_library_root() -> PathBuf {
    PathBuf::from("./NOTAS")
}
fn default_preferred_dir() -> String {
    "NOTAS_REVISADAS".to_string()
}
fn default_legacy_dirs() -> Vec<String> {
    vec!["NOTAS TÉCNICAS {year}".to_string(), ".".to_string()]
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string(), "**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedactionConfig {
    #[serde(default = "default_marker")]
    pub marker: String,
    /// Redact stored excerpts on display too, not only source text.
    #[serde(default = "default_true")]
    pub redact_on_display: bool,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            redact_on_display: true,
        }
    }
}

fn default_marker() -> String {
    DEFAULT_MARKER.to_string()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Words kept on each side of a snippet anchor.
    #[serde(default = "default_snippet_words")]
    pub snippet_words: usize,
    /// Length of the stored excerpt, in characters.
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
    /// Treat a blank query as "list every document".
    #[serde(default)]
    pub list_all_on_empty: bool,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            snippet_words: default_snippet_words(),
            excerpt_chars: default_excerpt_chars(),
            list_all_on_empty: false,
            placeholder: default_placeholder(),
        }
    }
}

fn default_page_size() -> usize {
    20
}
fn default_snippet_words() -> usize {
    DEFAULT_WINDOW_WORDS
}
fn default_excerpt_chars() -> usize {
    400
}
fn default_placeholder() -> String {
    DEFAULT_PLACEHOLDER.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

impl Config {
    /// Defaults for every section, for commands that tolerate a missing file.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn compose_options(&self) -> ComposeOptions {
        ComposeOptions {
            snippet: SnippetOptions::symmetric(self.search.snippet_words),
            placeholder: self.search.placeholder.clone(),
            redact_on_display: self.redaction.redact_on_display,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.search.page_size == 0 {
        bail!("search.page_size must be >= 1");
    }
    if config.search.snippet_words == 0 {
        bail!("search.snippet_words must be >= 1");
    }
    if config.search.excerpt_chars == 0 {
        bail!("search.excerpt_chars must be >= 1");
    }
    if config.redaction.marker.trim().is_empty() {
        bail!("redaction.marker must not be empty");
    }
    Ok(())
}
