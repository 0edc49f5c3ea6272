use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const SCHEMA: &str = r#"{
  "fileTypes": ["PDF", "TIFF"],
  "documentTypeGroups": [
    { "name": "TAX",
      "documentTypes": [
        { "name": "RETURN",
          "keywordRecordTypes": [
            { "name": "Standalone",
              "keywordTypes": [
                { "name": "DLN", "dataType": "AlphaNumeric", "required": true },
                { "name": "Amount", "dataType": "Currency" },
                { "name": "TaxYear", "dataType": "Numeric9" },
                { "name": "Received", "dataType": "Date" } ] } ] } ] } ]
}"#;

fn docbatch_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_docbatch"))
}

struct TestEnv {
    _tmp: TempDir,
    root: PathBuf,
    config_path: PathBuf,
}

impl TestEnv {
    fn batch_dir(&self) -> PathBuf {
        self.root.join("batch")
    }

    fn write_batch(&self, name: &str, content: &str) {
        fs::write(self.batch_dir().join(name), content).unwrap();
    }
}

fn setup_test_env_with_group(group: &str) -> TestEnv {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    // Source documents for archive
    let returns = root.join("batch").join("returns");
    fs::create_dir_all(&returns).unwrap();
    fs::write(returns.join("0001.pdf"), b"%PDF-1.4 first return").unwrap();
    fs::write(returns.join("0002.pdf"), b"%PDF-1.4 second return").unwrap();

    fs::write(root.join("schema.json"), SCHEMA).unwrap();

    let config_content = format!(
        r#"[repository]
path = "{root}/data/repository.sqlite"

[batch]
directory = "{root}/batch"
document_type_group = "{group}"

[logging]
level = "warn"
"#,
        root = root.display(),
        group = group,
    );

    let config_path = config_dir.join("docbatch.toml");
    fs::write(&config_path, config_content).unwrap();

    TestEnv {
        _tmp: tmp,
        root,
        config_path,
    }
}

fn setup_test_env() -> TestEnv {
    setup_test_env_with_group("TAX")
}

fn run_docbatch(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docbatch_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docbatch binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn run_json(env: &TestEnv, args: &[&str]) -> Value {
    let mut full: Vec<&str> = args.to_vec();
    full.push("--json");
    let (stdout, stderr, success) = run_docbatch(&env.config_path, &full);
    assert!(success, "{:?} failed: stdout={}, stderr={}", args, stdout, stderr);
    serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("stdout is not JSON ({}): {}", e, stdout))
}

fn prepared_env() -> TestEnv {
    let env = setup_test_env();
    let (_, stderr, success) = run_docbatch(&env.config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    let schema = env.root.join("schema.json");
    let (stdout, stderr, success) =
        run_docbatch(&env.config_path, &["load-schema", schema.to_str().unwrap()]);
    assert!(success, "load-schema failed: stdout={}, stderr={}", stdout, stderr);
    env
}

fn document_ids(report: &Value) -> Vec<i64> {
    report["document_ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_i64().unwrap())
        .collect()
}

#[test]
fn test_init_creates_database() {
    let env = setup_test_env();

    let (stdout, stderr, success) = run_docbatch(&env.config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(env.root.join("data/repository.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let env = setup_test_env();

    let (_, _, success1) = run_docbatch(&env.config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_docbatch(&env.config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_load_schema_idempotent() {
    let env = prepared_env();
    let schema = env.root.join("schema.json");

    let (stdout, _, success) =
        run_docbatch(&env.config_path, &["load-schema", schema.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("groups added:         0"), "{}", stdout);
    assert!(stdout.contains("ok"));
}

#[test]
fn test_archive_query_reindex_round_trip() {
    let env = prepared_env();

    env.write_batch(
        "archive.json",
        r#"{ "contents": [
            { "file": "returns/0001.pdf", "documentType": "RETURN", "fileTypes": ["PDF"],
              "keywords": { "DLN": "06122018", "Amount": "10.50", "TaxYear": "2018" } },
            { "file": "returns/missing.pdf", "documentType": "RETURN", "fileTypes": ["PDF"],
              "keywords": { "DLN": "07000000" } },
            { "file": "returns/0002.pdf", "documentType": "RETURN", "fileTypes": ["PDF"],
              "keywords": { "DLN": "08000000", "Received": "06/12/2018" } }
        ] }"#,
    );
    let archive = run_json(&env, &["archive"]);
    assert_eq!(archive["succeeded"], 2);
    assert_eq!(archive["skipped"], 1);
    assert_eq!(archive["items"][1]["status"], "skipped");
    let stored = document_ids(&archive);
    assert_eq!(stored.len(), 2);

    env.write_batch(
        "query.json",
        r#"{ "contents": [ { "documentType": "RETURN", "keywords": { "DLN": "06122018" } } ] }"#,
    );
    let query = run_json(&env, &["query"]);
    assert_eq!(document_ids(&query), vec![stored[0]]);
    let display = query["items"][0]["hits"][0]["display_values"]
        .as_array()
        .unwrap();
    assert_eq!(display.len(), 1);

    env.write_batch(
        "reindex.json",
        &format!(
            r#"{{ "contents": [
                {{ "documentID": "{}", "documentType": "RETURN", "keywords": {{ "Amount": "19.99" }} }},
                {{ "documentID": "{}", "documentType": "RETURN", "keywords": {{ "TaxYear": "soon" }} }}
            ] }}"#,
            stored[0], stored[0]
        ),
    );
    let reindex = run_json(&env, &["reindex"]);
    assert_eq!(reindex["items"][0]["status"], "ok");
    assert_eq!(reindex["items"][1]["status"], "failed");
    assert!(reindex["items"][1]["error"]
        .as_str()
        .unwrap()
        .contains("TaxYear"));

    env.write_batch(
        "query.json",
        r#"{ "contents": [
            { "documentType": "RETURN", "keywords": { "Amount": "19.990" } },
            { "documentType": "RETURN", "keywords": { "Amount": "10.50" } }
        ] }"#,
    );
    let query = run_json(&env, &["query"]);
    assert_eq!(query["items"][0]["document_ids"][0], stored[0]);
    assert!(query["items"][1]["document_ids"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[test]
fn test_text_report_ends_with_ok() {
    let env = prepared_env();
    env.write_batch(
        "query.json",
        r#"{ "contents": [
            { "documentType": "RETURN" },
            { "documentType": "INVOICE" }
        ] }"#,
    );

    let (stdout, stderr, success) = run_docbatch(&env.config_path, &["query"]);
    assert!(success, "query failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("[0] ok"), "{}", stdout);
    assert!(stdout.contains("[1] failed: document type not found: INVOICE"), "{}", stdout);
    assert!(stdout.contains("succeeded: 1"));
    assert!(stdout.trim_end().ends_with("ok"));
}

#[test]
fn test_run_selects_operation_by_file_name() {
    let env = prepared_env();
    env.write_batch(
        "query.json",
        r#"{ "contents": [ { "documentType": "RETURN" } ] }"#,
    );

    let report = run_json(&env, &["run", "query.json"]);
    assert_eq!(report["operation"], "query");

    env.write_batch("other.json", r#"{ "contents": [] }"#);
    let (_, stderr, success) = run_docbatch(&env.config_path, &["run", "other.json"]);
    assert!(!success);
    assert!(stderr.contains("Cannot tell the operation"), "{}", stderr);
}

#[test]
fn test_limit_truncates_batch() {
    let env = prepared_env();
    env.write_batch(
        "query.json",
        r#"{ "contents": [
            { "documentType": "RETURN" },
            { "documentType": "RETURN" },
            { "documentType": "RETURN" }
        ] }"#,
    );

    let report = run_json(&env, &["query", "--limit", "2"]);
    assert_eq!(report["items"].as_array().unwrap().len(), 2);
}

#[test]
fn test_missing_batch_file_is_run_level_failure() {
    let env = prepared_env();

    let (stdout, stderr, success) = run_docbatch(&env.config_path, &["archive"]);
    assert!(!success);
    assert!(stderr.contains("malformed batch"), "{}", stderr);
    assert!(!stdout.contains("ok"));
}

#[test]
fn test_malformed_batch_is_run_level_failure() {
    let env = prepared_env();
    env.write_batch("reindex.json", r#"{ "items": [] }"#);

    let (_, stderr, success) = run_docbatch(&env.config_path, &["reindex"]);
    assert!(!success);
    assert!(stderr.contains("contents"), "{}", stderr);
}

#[test]
fn test_unknown_archive_group_stores_nothing() {
    let env = setup_test_env_with_group("LEGAL");
    run_docbatch(&env.config_path, &["init"]);
    let schema = env.root.join("schema.json");
    run_docbatch(&env.config_path, &["load-schema", schema.to_str().unwrap()]);
    env.write_batch(
        "archive.json",
        r#"{ "contents": [
            { "file": "returns/0001.pdf", "documentType": "RETURN", "fileTypes": ["PDF"],
              "keywords": { "DLN": "1" } }
        ] }"#,
    );

    let (_, stderr, success) = run_docbatch(&env.config_path, &["archive"]);
    assert!(!success);
    assert!(stderr.contains("document type group not found: LEGAL"), "{}", stderr);

    env.write_batch(
        "query.json",
        r#"{ "contents": [ { "documentType": "RETURN" } ] }"#,
    );
    let query = run_json(&env, &["query"]);
    assert!(document_ids(&query).is_empty());
}

#[test]
fn test_export_config_writes_group_array() {
    let env = prepared_env();

    let (stdout, stderr, success) = run_docbatch(&env.config_path, &["export-config"]);
    assert!(success, "export-config failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("RETURN (4 keywords)"), "{}", stdout);

    let dump: Value =
        serde_json::from_str(&fs::read_to_string(env.batch_dir().join("config.json")).unwrap())
            .unwrap();
    let groups = dump.as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["name"], "TAX");
    let keywords = groups[0]["documentTypes"][0]["keywordTypes"]
        .as_array()
        .unwrap();
    assert_eq!(keywords[0]["name"], "DLN");
    assert_eq!(keywords[0]["dataType"], "AlphaNumeric");
    assert_eq!(keywords[0]["required"], true);
}

#[test]
fn test_invalid_config_rejected() {
    let env = setup_test_env();
    fs::write(
        &env.config_path,
        "[repository]\npath = \"x.sqlite\"\n\n[logging]\nformat = \"xml\"\n",
    )
    .unwrap();

    let (_, stderr, success) = run_docbatch(&env.config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("logging format"), "{}", stderr);
}
