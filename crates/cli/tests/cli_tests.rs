// End-to-end tests for the pcon-lookup binary: exit codes and the --json stdout contract.
// Run with: cargo test -p pcon-cli --test cli_tests

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn pcon() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pcon-lookup"));
    cmd.env("PCON_LOG", "error");
    cmd
}

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// A scratch directory holding copies of every fixture.
fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for entry in std::fs::read_dir(fixtures_dir()).unwrap() {
        let path = entry.unwrap().path();
        std::fs::copy(&path, dir.path().join(path.file_name().unwrap())).unwrap();
    }
    dir
}

fn write_config(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn single_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim())
        .unwrap_or_else(|e| panic!("stdout must be one JSON value: {e}\n{stdout}"))
}

const TABULAR: &str = r#"
name = "cli tabular"

[evidence]
kind = "combined_csv"
file = "combined.csv"

[reference]
file = "constituencies.csv"

[output]
kind = "tabular"
file = "postcode-lookup.csv"
"#;

const RELATIONAL: &str = r#"
name = "cli relational"
parallel = true

[evidence]
kind = "sources"
[evidence.addresses]
file = "addresses.csv"
[evidence.onspd]
file = "onspd.csv"
[evidence.onspd.columns]
postcode = "pcds"
constituency = "pcon"
terminated = "doterm"
[evidence.mysociety]
file = "mysociety.csv"
[evidence.mysociety.columns]
constituency = "short_code"

[reference]
file = "constituencies.csv"

[output]
kind = "relational"
database = "lookup.db"
"#;

// ===========================================================================
// validate
// ===========================================================================

#[test]
fn validate_accepts_good_config() {
    let dir = workspace();
    let config = write_config(dir.path(), "lookup.toml", TABULAR);
    let output = pcon().args(["validate"]).arg(&config).output().unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("valid: 'cli tabular'"));
}

#[test]
fn validate_rejects_unknown_output_kind() {
    let dir = workspace();
    let config = write_config(
        dir.path(),
        "lookup.toml",
        &TABULAR.replace("kind = \"tabular\"", "kind = \"parquet\""),
    );
    let output = pcon().args(["validate"]).arg(&config).output().unwrap();
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn missing_config_is_usage_error() {
    let output = pcon().args(["validate", "/nonexistent/lookup.toml"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

// ===========================================================================
// generate
// ===========================================================================

#[test]
fn generate_tabular_json_summary() {
    let dir = workspace();
    let config = write_config(dir.path(), "lookup.toml", TABULAR);
    let output = pcon().args(["generate", "--json"]).arg(&config).output().unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let val = single_json(&output);
    assert_eq!(val["meta"]["config_name"], "cli tabular");
    assert_eq!(val["summary"]["postcodes_resolved"], 3);
    assert_eq!(val["summary"]["rows_written"], 3);
    assert_eq!(val["summary"]["unknown_constituency_codes"], serde_json::json!(["LEY"]));

    let csv = std::fs::read_to_string(dir.path().join("postcode-lookup.csv")).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "postcode,pcon_1,pcon_2,pcon_3,pcon_4,pcon_5,pcon_6");
    assert_eq!(lines[2], "E17 0GF,WAL,LEY,,,,");
}

#[test]
fn generate_without_json_keeps_stdout_empty() {
    let dir = workspace();
    let config = write_config(dir.path(), "lookup.toml", TABULAR);
    let output = pcon().args(["generate"]).arg(&config).output().unwrap();
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    assert!(stderr(&output).contains("3 postcodes"));
}

#[test]
fn corrupt_evidence_exits_4_and_skip_recovers() {
    let dir = workspace();
    let mut combined = std::fs::read_to_string(dir.path().join("combined.csv")).unwrap();
    combined.push_str("N1 1AA,ISL,lots,,,,,,,,,ISL,,ISL,\n");
    std::fs::write(dir.path().join("combined.csv"), combined).unwrap();

    let config = write_config(dir.path(), "lookup.toml", TABULAR);
    let output = pcon().args(["generate"]).arg(&config).output().unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert!(stderr(&output).contains("corrupt record"));
    assert!(stderr(&output).contains("on_corrupt"));

    let skip = format!("on_corrupt = \"skip\"\n{TABULAR}");
    let config = write_config(dir.path(), "skip.toml", &skip);
    let output = pcon().args(["generate", "--json"]).arg(&config).output().unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(single_json(&output)["summary"]["skipped_records"], 1);
}

#[test]
fn missing_evidence_file_exits_4() {
    let dir = workspace();
    std::fs::remove_file(dir.path().join("combined.csv")).unwrap();
    let config = write_config(dir.path(), "lookup.toml", TABULAR);
    let output = pcon().args(["generate"]).arg(&config).output().unwrap();
    assert_eq!(output.status.code(), Some(4));
}

// ===========================================================================
// lookup
// ===========================================================================

#[test]
fn generate_relational_then_lookup() {
    let dir = workspace();
    let config = write_config(dir.path(), "lookup.toml", RELATIONAL);
    for _ in 0..2 {
        let output = pcon().args(["generate"]).arg(&config).output().unwrap();
        assert!(output.status.success(), "stderr: {}", stderr(&output));
    }

    let db = dir.path().join("lookup.db");
    let output = pcon()
        .args(["lookup", "--json"])
        .arg(&db)
        .arg("sw1a1aa")
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let val = single_json(&output);
    assert_eq!(val["postcode"], "SW1A 1AA");
    let hits = val["constituencies"].as_array().unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0]["code"], "CLW");
    assert_eq!(hits[0]["name"], "Cities of London and Westminster");
    assert_eq!(hits[0]["confidence"], 0.875);

    let output = pcon().arg("lookup").arg(&db).arg("N1 1AA").output().unwrap();
    assert_eq!(output.status.code(), Some(6));

    let output = pcon().arg("lookup").arg(&db).arg("not a postcode").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn lookup_missing_database() {
    let dir = tempfile::tempdir().unwrap();
    let output = pcon()
        .arg("lookup")
        .arg(dir.path().join("absent.db"))
        .arg("SW1A 1AA")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(!dir.path().join("absent.db").exists());
}

// ===========================================================================
// postcode
// ===========================================================================

#[test]
fn postcode_json_breakdown() {
    let output = pcon().args(["postcode", "sw1a 1aa", "E170GF", "--json"]).output().unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let val = single_json(&output);
    let reports = val.as_array().unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["parts"]["unit"], "SW1A 1AA");
    assert_eq!(reports[0]["parts"]["district"], "SW1A");
    assert_eq!(reports[1]["parts"]["key"], "E170GF");
    assert_eq!(reports[1]["parts"]["sector"], "E17 0");
}

#[test]
fn postcode_reports_invalid() {
    let output = pcon().args(["postcode", "1234"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("1234\tinvalid"));
}
