use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn nv_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_nv"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let y2024 = root.join("NOTAS").join("NOTAS TÉCNICAS 2024");
    let y2023 = root.join("NOTAS").join("NOTAS TÉCNICAS 2023");
    fs::create_dir_all(&y2024).unwrap();
    fs::create_dir_all(&y2023).unwrap();
    fs::write(
        y2024.join("nota_tecnica_01_2024.txt"),
        "Aposentadoria rural do segurado especial.\n\nParecer assinado por Ana Silva.",
    )
    .unwrap();
    fs::write(
        y2023.join("nota_tecnica_07_2023.txt"),
        "Aposentadoria por idade urbana e regras de transição.",
    )
    .unwrap();
    fs::write(
        y2023.join("nota_tecnica_09_2023.txt"),
        "Pensão por morte e cota familiar.",
    )
    .unwrap();

    fs::write(
        root.join("terms.toml"),
        "[categories]\nnomes = [\"Ana Silva\"]\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = '{root}/data/nv.sqlite'

[library]
root = '{root}/NOTAS'
include_globs = ["**/*.txt"]

[search]
page_size = 20

[server]
bind = "127.0.0.1:7341"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("nv.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_nv(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = nv_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run nv binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn run_json(config_path: &Path, args: &[&str]) -> serde_json::Value {
    let (stdout, stderr, success) = run_nv(config_path, args);
    assert!(success, "{:?} failed: stdout={}, stderr={}", args, stdout, stderr);
    serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("invalid JSON from {:?}: {}\n{}", args, e, stdout))
}

fn ingest_all(config_path: &Path) {
    let (stdout, stderr, success) = run_nv(config_path, &["terms", "import", &terms_path(config_path)]);
    assert!(success, "terms import failed: stdout={}, stderr={}", stdout, stderr);
    let (stdout, stderr, success) = run_nv(config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
}

fn terms_path(config_path: &Path) -> String {
    config_path
        .parent()
        .and_then(|p| p.parent())
        .unwrap()
        .join("terms.toml")
        .display()
        .to_string()
}

fn item_ids(page: &serde_json::Value) -> Vec<String> {
    page["groups"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|g| g["items"].as_array().unwrap().iter())
        .map(|i| i["document_id"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_nv(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/nv.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_nv(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_nv(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_missing_explicit_config_fails() {
    let (tmp, _config_path) = setup_test_env();
    let (_, stderr, success) = run_nv(&tmp.path().join("nope.toml"), &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Config file not found"));
}

#[test]
fn test_ingest_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_nv(&config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("inserted: 3"), "stdout={}", stdout);

    let (stdout, _, success) = run_nv(&config_path, &["ingest"]);
    assert!(success);
    assert!(stdout.contains("inserted: 0"), "stdout={}", stdout);
    assert!(stdout.contains("updated:  3"), "stdout={}", stdout);

    let page = run_json(&config_path, &["search", "--all", "--json"]);
    assert_eq!(page["total"], 3);
}

#[test]
fn test_ingest_dry_run_writes_nothing() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_nv(&config_path, &["ingest", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("files found: 3"));
    assert!(stdout.contains("[2024]"));
    assert!(stdout.contains("[2023]"));
    assert!(!tmp.path().join("data/nv.sqlite").exists());
}

#[test]
fn test_search_groups_by_year() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);

    let page = run_json(&config_path, &["search", "aposentadoria", "--json"]);
    assert_eq!(page["mechanism"], "primary-index");
    assert_eq!(page["total"], 2);

    let groups = page["groups"].as_array().unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0]["year"], 2024);
    assert_eq!(groups[1]["year"], 2023);
    assert_eq!(groups[0]["items"][0]["filename"], "nota_tecnica_01_2024.txt");
}

#[test]
fn test_search_excerpts_are_redacted() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);

    let page = run_json(&config_path, &["search", "parecer", "--json"]);
    assert_eq!(page["total"], 1);
    let item = &page["groups"][0]["items"][0];
    let excerpt = item["excerpt"].as_str().unwrap();
    assert!(excerpt.contains("[REMOVIDO]"), "excerpt={}", excerpt);
    assert!(!excerpt.contains("Ana Silva"), "excerpt={}", excerpt);

    // the blocked name itself is not searchable
    let page = run_json(&config_path, &["search", "silva", "--json"]);
    assert_eq!(page["total"], 0);
}

#[test]
fn test_search_falls_back_to_substring() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);

    // an infix matches no index prefix but does match the stored excerpts
    let page = run_json(&config_path, &["search", "entadoria", "--json"]);
    assert_eq!(page["mechanism"], "substring-fallback");
    assert_eq!(page["total"], 2);
}

#[test]
fn test_search_no_results_is_not_an_error() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);

    let (stdout, _, success) = run_nv(&config_path, &["search", "xyzzy"]);
    assert!(success);
    assert!(stdout.contains("mechanism: substring-fallback"));
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_without_database_is_unavailable() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_nv(&config_path, &["search", "aposentadoria"]);
    assert!(success);
    assert!(stdout.contains("mechanism: unavailable"), "stdout={}", stdout);
}

#[test]
fn test_empty_query_lists_nothing_by_default() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);

    let page = run_json(&config_path, &["search", "", "--json"]);
    assert_eq!(page["total"], 0);

    let page = run_json(&config_path, &["search", "__ALL__", "--json"]);
    assert_eq!(page["mechanism"], "all-documents");
    assert_eq!(page["total"], 3);
}

#[test]
fn test_search_year_filter_and_paging() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);

    let page = run_json(
        &config_path,
        &["search", "aposentadoria", "--year", "2023", "--json"],
    );
    assert_eq!(page["total"], 1);

    let first = run_json(&config_path, &["search", "--all", "--limit", "2", "--json"]);
    let second = run_json(
        &config_path,
        &["search", "--all", "--limit", "2", "--offset", "2", "--json"],
    );
    assert_eq!(first["pagination"]["page_count"], 2);
    assert_eq!(first["pagination"]["next_offset"], 2);
    let mut ids = item_ids(&first);
    ids.extend(item_ids(&second));
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
}

#[test]
fn test_get_edit_delete_document() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);

    let page = run_json(&config_path, &["search", "pensão", "--json"]);
    let id = page["groups"][0]["items"][0]["document_id"]
        .as_str()
        .unwrap()
        .to_string();

    let doc = run_json(&config_path, &["get", &id, "--json"]);
    assert_eq!(doc["status_label"], "Vigente");
    assert!(doc.get("original_text").is_none());

    let (stdout, stderr, success) = run_nv(
        &config_path,
        &["edit", &id, "--status", "Revogada", "--status-note", "NT 3/2024"],
    );
    assert!(success, "edit failed: stdout={}, stderr={}", stdout, stderr);

    let doc = run_json(&config_path, &["get", &id, "--original", "--json"]);
    assert_eq!(doc["status"], "revoked");
    assert_eq!(doc["status_note"], "NT 3/2024");
    assert_eq!(doc["original_text"], "Pensão por morte e cota familiar.");

    let (_, _, success) = run_nv(&config_path, &["delete", &id]);
    assert!(success);
    let (_, stderr, success) = run_nv(&config_path, &["get", &id]);
    assert!(!success);
    assert!(stderr.contains("document not found"));

    let page = run_json(&config_path, &["search", "pensão", "--json"]);
    assert_eq!(page["total"], 0);
}

#[test]
fn test_edit_rejects_unknown_status() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_nv(&config_path, &["edit", "x", "--status", "talvez"]);
    assert!(!success);
    assert!(stderr.contains("unknown status"));
}

#[test]
fn test_redact_file() {
    let (tmp, config_path) = setup_test_env();
    ingest_all(&config_path);

    let input = tmp.path().join("input.txt");
    fs::write(&input, "Enviado por ANA SILVA, analista.").unwrap();
    let (stdout, _, success) = run_nv(&config_path, &["redact", input.to_str().unwrap()]);
    assert!(success);
    assert_eq!(stdout.trim(), "Enviado por [REMOVIDO], analista.");
}

#[test]
fn test_terms_lifecycle_and_resanitize() {
    let (tmp, config_path) = setup_test_env();
    ingest_all(&config_path);

    let list = tmp.path().join("extra.txt");
    fs::write(&list, "# orgaos\nsegurado especial\n").unwrap();
    let (stdout, _, success) = run_nv(
        &config_path,
        &["terms", "import", list.to_str().unwrap(), "--category", "termos"],
    );
    assert!(success);
    assert!(stdout.contains("added:    1"));

    let (stdout, _, success) = run_nv(&config_path, &["terms", "list"]);
    assert!(success);
    assert!(stdout.contains("segurado especial"));
    assert!(stdout.contains("2 term(s)"));

    let (stdout, _, success) = run_nv(&config_path, &["resanitize"]);
    assert!(success);
    assert!(stdout.contains("changed: 1"), "stdout={}", stdout);

    let page = run_json(&config_path, &["search", "segurado", "--json"]);
    assert_eq!(page["total"], 0);

    let (_, _, success) = run_nv(&config_path, &["terms", "disable", "999"]);
    assert!(!success);
}

#[test]
fn test_reindex_and_stats() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);

    let (stdout, _, success) = run_nv(&config_path, &["reindex"]);
    assert!(success);
    assert!(stdout.contains("added:   0"));
    assert!(stdout.contains("removed: 0"));

    let (stdout, _, success) = run_nv(&config_path, &["reindex", "--rebuild"]);
    assert!(success);
    assert!(stdout.contains("indexed: 3"));

    let stats = run_json(&config_path, &["stats", "--json"]);
    assert_eq!(stats["documents"], 3);
    assert_eq!(stats["index_entries"], 3);
    assert_eq!(stats["terms_enabled"], 1);
    assert_eq!(stats["by_year"][0]["year"], 2024);
}
