//! Binary integration tests

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const LAYOUT: &str = "config/layout.yaml";
const DUMP: &str = "test-data/documents.json";

fn monitor_sheets() -> Command {
    let mut cmd = Command::cargo_bin("monitor-sheets").unwrap();
    for var in [
        "GOOGLE_SHEET_ID",
        "GOOGLE_ACCESS_TOKEN",
        "GOOGLE_SHEETS_CREDENTIALS_PATH",
        "FIREBASE_CREDENTIALS_PATH",
        "FIRESTORE_PROJECT_ID",
        "FIRESTORE_COLLECTION_NAME",
        "LIMIT",
        "LAYOUT_PATH",
        "RUST_LOG",
        "CLICOLOR_FORCE",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("TIMEZONE", "America/Santiago").env("NO_COLOR", "1");
    cmd
}

// ═══════════════════════════════════════════════════════════════════════════
// CHECK
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_check_shipped_layout() {
    monitor_sheets()
        .args(["check", "--layout", LAYOUT])
        .assert()
        .success()
        .stdout(predicate::str::contains("Servidores"))
        .stdout(predicate::str::contains("Layout is valid"));
}

#[test]
fn test_check_rejects_bad_layout() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.yaml");
    fs::write(
        &path,
        "entities:\n  servers:\n    tab_name: S\n    columns:\n      a:\n        name: A\n        format: MONEY\n",
    )
    .unwrap();

    monitor_sheets()
        .args(["check", "--layout"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("schema"));
}

// ═══════════════════════════════════════════════════════════════════════════
// PREVIEW
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_preview_prints_datasets() {
    monitor_sheets()
        .args(["preview", "--input", DUMP, "--layout", LAYOUT])
        .assert()
        .success()
        .stdout(predicate::str::contains("Documents: 2"))
        .stdout(predicate::str::contains("cam-03"))
        .stdout(predicate::str::contains("2026-01-20 12:00:00"));
}

#[test]
fn test_preview_with_utc() {
    monitor_sheets()
        .args(["preview", "--input", DUMP, "--layout", LAYOUT, "--timezone", "UTC"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2026-01-20 15:00:00"));
}

#[test]
fn test_preview_unknown_timezone() {
    monitor_sheets()
        .args(["preview", "--input", DUMP, "--layout", LAYOUT, "--timezone", "Mars/Olympus"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown time zone"));
}

// ═══════════════════════════════════════════════════════════════════════════
// RUN / DASHBOARD
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_dry_run_publishes_in_memory() {
    monitor_sheets()
        .args(["run", "--dry-run", "--input", DUMP, "--layout", LAYOUT])
        .assert()
        .success()
        .stdout(predicate::str::contains("DRY RUN"))
        .stdout(predicate::str::contains("Servidores"))
        .stdout(predicate::str::contains("Calls issued"))
        .stdout(predicate::str::contains("Run complete"));
}

#[test]
fn test_dry_run_respects_limit() {
    monitor_sheets()
        .args(["run", "--dry-run", "--input", DUMP, "--layout", LAYOUT, "--limit", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Documents: 1"));
}

#[test]
fn test_real_run_needs_sheet_id() {
    monitor_sheets()
        .args(["run", "--input", DUMP, "--layout", LAYOUT])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GOOGLE_SHEET_ID"));
}

#[test]
fn test_run_without_input_needs_firestore_settings() {
    monitor_sheets()
        .args(["run", "--dry-run", "--layout", LAYOUT])
        .assert()
        .failure()
        .stderr(predicate::str::contains("FIRESTORE_COLLECTION_NAME"));

    monitor_sheets()
        .env("FIRESTORE_COLLECTION_NAME", "servers")
        .args(["run", "--dry-run", "--layout", LAYOUT])
        .assert()
        .failure()
        .stderr(predicate::str::contains("FIRESTORE_PROJECT_ID"));
}

#[test]
fn test_real_run_needs_sheets_credentials() {
    monitor_sheets()
        .env("GOOGLE_SHEET_ID", "sheet-123")
        .args(["run", "--input", DUMP, "--layout", LAYOUT])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GOOGLE_SHEETS_CREDENTIALS_PATH"));
}

#[test]
fn test_key_path_resolves_next_to_env_file() {
    let dir = TempDir::new().unwrap();
    let env = dir.path().join("monitor.env");
    fs::write(
        &env,
        "GOOGLE_SHEET_ID=sheet-123\nGOOGLE_SHEETS_CREDENTIALS_PATH=keys/sheets.json\n",
    )
    .unwrap();
    let expected = dir.path().join("keys").join("sheets.json");

    monitor_sheets()
        .args(["run", "--input", DUMP, "--layout", LAYOUT, "--env-file"])
        .arg(&env)
        .assert()
        .failure()
        .stderr(predicate::str::contains(expected.display().to_string()));
}

#[test]
fn test_env_file_is_loaded() {
    let dir = TempDir::new().unwrap();
    let env = dir.path().join("bad.env");
    fs::write(&env, "TIMEZONE=Nowhere/Special\n").unwrap();

    monitor_sheets()
        .env_remove("TIMEZONE")
        .args(["run", "--dry-run", "--input", DUMP, "--layout", LAYOUT, "--env-file"])
        .arg(&env)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nowhere/Special"));
}

#[test]
fn test_dashboard_dry_run() {
    monitor_sheets()
        .args(["dashboard", "--dry-run", "--layout", LAYOUT])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dashboard: 2 panels"));
}

#[test]
fn test_malformed_dotenv_fails() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(".env"), "this is not valid\nLIMIT=2\n").unwrap();
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));

    monitor_sheets()
        .current_dir(dir.path())
        .args(["run", "--dry-run", "--input"])
        .arg(root.join(DUMP))
        .arg("--layout")
        .arg(root.join(LAYOUT))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot load .env"));
}

#[test]
fn test_missing_dotenv_is_fine() {
    let dir = TempDir::new().unwrap();
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));

    monitor_sheets()
        .current_dir(dir.path())
        .args(["run", "--dry-run", "--input"])
        .arg(root.join(DUMP))
        .arg("--layout")
        .arg(root.join(LAYOUT))
        .assert()
        .success();
}
