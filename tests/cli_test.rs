//! End-to-end runs of the `journal` binary against a local database

use assert_cmd::Command;
use predicates::prelude::*;

mod common;

fn journal_cmd(config_path: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("journal").unwrap();
    cmd.env_remove("JOURNAL_BACKEND")
        .env_remove("JOURNAL_DB_PATH")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(config_path);
    cmd
}

fn local_config(dir: &std::path::Path) -> String {
    format!(
        r#"backend:
  type: local
  db_path: {}
  local_user:
    email: me@example.com
    name: Me
logging:
  level: warn
"#,
        dir.join("journal.db").display()
    )
}

#[test]
fn test_new_then_history_json() {
    let data = tempfile::TempDir::new().unwrap();
    let (_cfg_dir, config_path) = common::temp_config_file(&local_config(data.path()));

    journal_cmd(&config_path)
        .args(["new", "--name", "Morning pages"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Morning pages"));

    let output = journal_cmd(&config_path)
        .args(["history", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let listed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["chatName"], "Morning pages");
}

#[test]
fn test_empty_history() {
    let data = tempfile::TempDir::new().unwrap();
    let (_cfg_dir, config_path) = common::temp_config_file(&local_config(data.path()));

    journal_cmd(&config_path)
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("No conversations found."));
}

#[test]
fn test_db_path_flag_overrides_config() {
    let data = tempfile::TempDir::new().unwrap();
    let missing = data.path().join("missing.yaml");
    let db = data.path().join("flag.db");

    journal_cmd(&missing)
        .arg("--db-path")
        .arg(&db)
        .args(["new"])
        .assert()
        .success()
        .stdout(predicate::str::contains("New Voice Chat"));
    assert!(db.exists());
}

#[test]
fn test_blank_group_name_is_rejected() {
    let data = tempfile::TempDir::new().unwrap();
    let (_cfg_dir, config_path) = common::temp_config_file(&local_config(data.path()));

    journal_cmd(&config_path)
        .args(["group", "create", "  "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Group name cannot be empty"));

    journal_cmd(&config_path)
        .args(["group", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("You are not in any groups."));
}

#[test]
fn test_hosted_backend_requires_url() {
    let data = tempfile::TempDir::new().unwrap();
    let (_cfg_dir, config_path) = common::temp_config_file("backend:\n  type: supabase\n");

    journal_cmd(&config_path)
        .env_remove("JOURNAL_SUPABASE_URL")
        .arg("--db-path")
        .arg(data.path().join("unused.db"))
        .args(["auth", "whoami"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("backend.url is required"));
}
