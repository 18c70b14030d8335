//! Locating note files on disk.
//!
//! A stored `source_path` wins when it still exists. Otherwise the file is
//! looked up by name under the preferred directory, then under each legacy
//! directory, with `{year}` expanded to the note's year, and finally by a
//! case-insensitive stem match in those same directories.

use std::path::{Path, PathBuf};

use note_vault_core::models::QueryResult;
use note_vault_core::ranking::PageSource;

use crate::config::LibraryConfig;
use crate::extract;

/// Directories under the library root searched for a note, in order.
fn search_dirs(library: &LibraryConfig, year: Option<i32>) -> Vec<PathBuf> {
    let mut dirs = vec![library.root.join(&library.preferred_dir)];
    for dir in &library.legacy_dirs {
        if dir.contains("{year}") {
            let Some(y) = year else { continue };
            dirs.push(library.root.join(dir.replace("{year}", &y.to_string())));
        } else {
            dirs.push(library.root.join(dir));
        }
    }
    dirs
}

/// Candidate locations for a file, in lookup order.
pub fn candidate_paths(
    library: &LibraryConfig,
    source_path: Option<&str>,
    filename: &str,
    year: Option<i32>,
) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(p) = source_path {
        out.push(PathBuf::from(p));
    }
    out.extend(
        search_dirs(library, year)
            .into_iter()
            .map(|d| d.join(filename)),
    );
    out
}

/// A readable file in `dir` whose stem equals `stem`, ignoring case.
fn find_by_stem(dir: &Path, stem: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut matches: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && extract::content_type_for(p).is_some())
        .filter(|p| {
            p.file_stem()
                .map(|s| s.to_string_lossy().to_lowercase() == stem)
                .unwrap_or(false)
        })
        .collect();
    matches.sort();
    matches.into_iter().next()
}

pub fn resolve_path(
    library: &LibraryConfig,
    source_path: Option<&str>,
    filename: &str,
    year: Option<i32>,
) -> Option<PathBuf> {
    if let Some(found) = candidate_paths(library, source_path, filename, year)
        .into_iter()
        .find(|p| p.is_file())
    {
        return Some(found);
    }

    let stem = Path::new(filename)
        .file_stem()?
        .to_string_lossy()
        .to_lowercase();
    search_dirs(library, year)
        .iter()
        .find_map(|dir| find_by_stem(dir, &stem))
}

/// [`PageSource`] that reads result files from the configured library.
pub struct FsPageSource<'a> {
    library: &'a LibraryConfig,
}

impl<'a> FsPageSource<'a> {
    pub fn new(library: &'a LibraryConfig) -> Self {
        Self { library }
    }

    pub fn read_pages(&self, path: &Path) -> Option<Vec<String>> {
        match extract::extract_file_pages(path) {
            Ok(pages) => Some(pages),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not read source file");
                None
            }
        }
    }
}

impl PageSource for FsPageSource<'_> {
    fn pages(&self, row: &QueryResult) -> Option<Vec<String>> {
        let path = resolve_path(
            self.library,
            row.source_path.as_deref(),
            &row.filename,
            row.year,
        );
        match path {
            Some(p) => self.read_pages(&p),
            None => {
                tracing::debug!(filename = %row.filename, "source file not found");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn library(root: &Path) -> LibraryConfig {
        LibraryConfig {
            root: root.to_path_buf(),
            preferred_dir: "NOTAS_REVISADAS".into(),
            legacy_dirs: vec!["NOTAS TÉCNICAS {year}".into(), ".".into()],
            include_globs: vec!["**/*.txt".into()],
        }
    }

    #[test]
    fn test_candidate_order() {
        let lib = library(Path::new("/lib"));
        let paths = candidate_paths(&lib, Some("/x/a.pdf"), "a.pdf", Some(2023));
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/x/a.pdf"),
                PathBuf::from("/lib/NOTAS_REVISADAS/a.pdf"),
                PathBuf::from("/lib/NOTAS TÉCNICAS 2023/a.pdf"),
                PathBuf::from("/lib/./a.pdf"),
            ]
        );
        let no_year = candidate_paths(&lib, None, "a.pdf", None);
        assert_eq!(no_year.len(), 2);
    }

    #[test]
    fn test_resolve_prefers_revised_copy() {
        let tmp = TempDir::new().unwrap();
        let revised = tmp.path().join("NOTAS_REVISADAS");
        let legacy = tmp.path().join("NOTAS TÉCNICAS 2022");
        std::fs::create_dir_all(&revised).unwrap();
        std::fs::create_dir_all(&legacy).unwrap();
        std::fs::write(legacy.join("n.txt"), "antiga").unwrap();

        let lib = library(tmp.path());
        let found = resolve_path(&lib, None, "n.txt", Some(2022)).unwrap();
        assert_eq!(found, legacy.join("n.txt"));

        std::fs::write(revised.join("n.txt"), "revisada").unwrap();
        let found = resolve_path(&lib, Some("/missing/n.txt"), "n.txt", Some(2022)).unwrap();
        assert_eq!(found, revised.join("n.txt"));
    }

    #[test]
    fn test_resolve_by_stem_ignores_case_and_extension() {
        let tmp = TempDir::new().unwrap();
        let legacy = tmp.path().join("NOTAS TÉCNICAS 2021");
        std::fs::create_dir_all(&legacy).unwrap();
        std::fs::write(legacy.join("NT_07_2021.TXT"), "texto").unwrap();

        let lib = library(tmp.path());
        let found = resolve_path(&lib, None, "nt_07_2021.pdf", Some(2021)).unwrap();
        assert_eq!(found, legacy.join("NT_07_2021.TXT"));
        assert!(resolve_path(&lib, None, "outra.pdf", Some(2021)).is_none());
    }

    #[test]
    fn test_page_source_reads_text() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("n.txt");
        std::fs::write(&path, "benefício rural").unwrap();

        let lib = library(tmp.path());
        let source = FsPageSource::new(&lib);
        assert_eq!(source.read_pages(&path), Some(vec!["benefício rural".to_string()]));
        assert_eq!(source.read_pages(&tmp.path().join("missing.txt")), None);
    }
}
