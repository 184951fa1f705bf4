use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn boardsync() -> Command {
    Command::cargo_bin("boardsync").expect("boardsync binary")
}

fn write_config(dir: &TempDir, sync_path: &std::path::Path) -> std::path::PathBuf {
    let config_path = dir.path().join("config.yaml");
    let yaml = format!(
        "store:\n  base_url: http://localhost:3000\nsync_path: {}\n",
        sync_path.display()
    );
    fs::write(&config_path, yaml).expect("write config");
    config_path
}

#[test]
fn help_lists_all_subcommands() {
    boardsync()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("pull"))
        .stdout(predicate::str::contains("push"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("daemon"));
}

#[test]
fn status_json_reports_baseline_entities() {
    let home = TempDir::new().unwrap();
    let sync_dir = home.path().join("sync");
    fs::create_dir_all(&sync_dir).unwrap();
    let config_path = write_config(&home, &sync_dir);

    let baseline = serde_json::json!({
        "dashboardVersionByUID": { "d1": 4 },
        "dashboardMetaByUID": {
            "d1": {
                "id": 1,
                "title": "Latency",
                "uri": "db/latency",
                "type": "dash-db",
                "uid": "d1",
                "folderUid": "f1"
            }
        },
        "libraryVersionByUID": {},
        "libraryMetaByUID": {},
        "foldersMetaByUID": {
            "f1": {
                "id": 7,
                "title": "Platform",
                "uri": "db/platform",
                "type": "dash-folder",
                "uid": "f1"
            }
        }
    });
    fs::write(
        sync_dir.join("defs.json"),
        serde_json::to_string_pretty(&baseline).unwrap(),
    )
    .unwrap();

    let output = boardsync()
        .arg("--config")
        .arg(&config_path)
        .arg("status")
        .arg("--json")
        .assert()
        .success();

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("status JSON");
    assert_eq!(parsed["summary"]["dashboards"], 1);
    assert_eq!(parsed["summary"]["folders"], 1);
    assert_eq!(parsed["summary"]["libraries"], 0);

    let entities = parsed["entities"].as_array().expect("entities array");
    let dashboard = entities
        .iter()
        .find(|e| e["kind"] == "dashboard")
        .expect("dashboard row");
    assert_eq!(dashboard["uid"], "d1");
    assert_eq!(dashboard["title"], "Latency");
    assert_eq!(dashboard["version"], 4);

    let folder = entities
        .iter()
        .find(|e| e["kind"] == "folder")
        .expect("folder row");
    assert_eq!(folder["title"], "Platform");
    assert!(folder.get("version").is_none() || folder["version"].is_null());
}

#[test]
fn status_with_empty_baseline_suggests_pull() {
    let home = TempDir::new().unwrap();
    let sync_dir = home.path().join("sync");
    fs::create_dir_all(&sync_dir).unwrap();
    let config_path = write_config(&home, &sync_dir);

    boardsync()
        .arg("--config")
        .arg(&config_path)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("boardsync pull"));
}

#[test]
fn missing_config_is_a_clear_error() {
    boardsync()
        .arg("--config")
        .arg("/nonexistent/config.yaml")
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

#[test]
fn daemon_status_reports_not_running() {
    let home = TempDir::new().unwrap();

    boardsync()
        .env("HOME", home.path())
        .arg("daemon")
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"running\": false"));
}

#[test]
fn daemon_pull_without_a_daemon_suggests_direct_pull() {
    let home = TempDir::new().unwrap();

    boardsync()
        .env("HOME", home.path())
        .arg("daemon")
        .arg("pull")
        .assert()
        .success()
        .stdout(predicate::str::contains("daemon is not running"));
}

#[test]
fn push_requires_a_mode_flag() {
    let home = TempDir::new().unwrap();
    let sync_dir = home.path().join("sync");
    fs::create_dir_all(&sync_dir).unwrap();
    let config_path = write_config(&home, &sync_dir);

    boardsync()
        .arg("--config")
        .arg(&config_path)
        .arg("push")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--all or --since"));
}
