//! The `taskquest-updater` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

use crate::common::TestEnv;

const PAYLOAD: &[u8] = b"TaskQuest 1.3.0";

fn updater(env: &TestEnv) -> Command {
    let mut cmd = Command::cargo_bin("taskquest-updater").unwrap();
    cmd.env("TASKQUEST_DATA_DIR", &env.data_dir)
        .env("TASKQUEST_NO_PROGRESS", "1")
        .env_remove("TASKQUEST_APP_EXE")
        .env_remove("RUST_LOG");
    cmd
}

fn stored_config(env: &TestEnv) -> Value {
    serde_json::from_str(&std::fs::read_to_string(env.data_dir.join("update-config.json")).unwrap())
        .unwrap()
}

#[test]
fn test_help_lists_commands() {
    let env = TestEnv::new();
    updater(&env).arg("--help").assert().success().stdout(
        predicate::str::contains("check")
            .and(predicate::str::contains("download"))
            .and(predicate::str::contains("install"))
            .and(predicate::str::contains("config"))
            .and(predicate::str::contains("backup"))
            .and(predicate::str::contains("serve")),
    );
}

#[test]
fn test_config_path_honours_data_dir() {
    let env = TestEnv::new();
    updater(&env)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("update-config.json"));

    let other = env.path().join("elsewhere");
    updater(&env)
        .args(["config", "path", "--data-dir"])
        .arg(&other)
        .assert()
        .success()
        .stdout(predicate::str::contains("elsewhere"));
}

#[test]
fn test_config_set_and_show() {
    let env = TestEnv::new();
    updater(&env).args(["config", "set", "checkInterval", "daily"]).assert().success();
    updater(&env).args(["config", "set", "githubToken", "ghp_abcdef1234"]).assert().success();

    let stored = stored_config(&env);
    assert_eq!(stored["checkInterval"], "daily");
    assert_eq!(stored["githubToken"], "ghp_abcdef1234");

    updater(&env)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("****1234").and(predicate::str::contains("ghp_").not()));

    let output = updater(&env).args(["config", "show", "--json"]).output().unwrap();
    let shown: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(shown["checkInterval"], "daily");
}

#[test]
fn test_invalid_config_is_rejected() {
    let env = TestEnv::new();
    updater(&env)
        .args(["config", "set", "checkInterval", "hourly"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
    updater(&env).args(["config", "set", "colour", "red"]).assert().failure();
    assert!(!env.data_dir.join("update-config.json").exists());
}

#[test]
fn test_config_reset() {
    let env = TestEnv::new();
    updater(&env).args(["config", "set", "enabled", "false"]).assert().success();
    updater(&env).args(["config", "reset"]).assert().success();
    assert_eq!(stored_config(&env)["enabled"], true);
}

#[test]
fn test_check_against_local_feed() {
    let env = TestEnv::new();
    env.use_local_feed().publish("v1.3.0", "TaskQuest-1.3.0.AppImage", PAYLOAD);

    updater(&env)
        .args(["check", "--app-version", "1.2.4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1.3.0").and(predicate::str::contains("update available")));

    updater(&env)
        .args(["check", "--app-version", "1.3.0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("up to date"));

    let output = updater(&env).args(["check", "--json", "--app-version", "1.2.4"]).output().unwrap();
    let release: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(release["version"], "1.3.0");
    assert_eq!(release["hasUpdate"], true);
}

#[test]
fn test_check_failure_exits_nonzero() {
    let env = TestEnv::new();
    env.use_local_feed();

    updater(&env)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Release not found"));
}

#[test]
fn test_check_when_disabled() {
    let env = TestEnv::new();
    env.use_local_feed().publish("1.3.0", "TaskQuest-1.3.0.AppImage", PAYLOAD);
    updater(&env).args(["config", "set", "enabled", "false"]).assert().success();

    updater(&env)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Updates are disabled"));
}

#[test]
fn test_download_stages_artifact_and_backs_up() {
    let env = TestEnv::new();
    env.seed_app_state().use_local_feed().publish("1.3.0", "TaskQuest-1.3.0.AppImage", PAYLOAD);

    updater(&env)
        .args(["download", "--app-version", "1.2.4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Update downloaded"));

    let staged = env.data_dir.join("updates").join("TaskQuest-1.3.0.AppImage");
    assert_eq!(std::fs::read(staged).unwrap(), PAYLOAD);

    updater(&env)
        .args(["backup", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("backup-"));
}

#[test]
fn test_download_without_newer_release() {
    let env = TestEnv::new();
    env.use_local_feed().publish("1.3.0", "TaskQuest-1.3.0.AppImage", PAYLOAD);

    updater(&env)
        .args(["download", "--app-version", "1.3.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No updates available"));
    assert!(!env.data_dir.join("updates").exists());
}

fn backup_count(env: &TestEnv) -> usize {
    std::fs::read_dir(env.data_dir.join("backups")).map_or(0, |entries| entries.count())
}

/// `install --yes` with the manual installer. PATH points at an empty
/// directory so no browser can be found.
fn manual_install(env: &TestEnv) -> Command {
    let mut cmd = updater(env);
    cmd.env("PATH", env.path().join("no-tools"))
        .args(["install", "--yes", "--installer", "manual", "--app-version", "1.0.0"])
        .timeout(std::time::Duration::from_secs(60));
    cmd
}

#[test]
fn test_install_without_application_executable_fails_once() {
    let env = TestEnv::new();
    env.seed_app_state().use_local_feed().publish("2.0.0", "TaskQuest-2.0.0.AppImage", PAYLOAD);

    manual_install(&env)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--app-exe"));
    assert_eq!(backup_count(&env), 1);
}

#[cfg(unix)]
#[test]
fn test_install_restarts_the_application_once() {
    let env = TestEnv::new();
    env.seed_app_state().use_local_feed().publish("2.0.0", "TaskQuest-2.0.0.AppImage", PAYLOAD);

    manual_install(&env)
        .args(["--app-exe", "/bin/true"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Could not open the release page"));

    // Leave time for a stray second cycle to show up.
    std::thread::sleep(std::time::Duration::from_secs(2));
    assert_eq!(backup_count(&env), 1);
}

#[test]
fn test_backup_create_list_restore() {
    let env = TestEnv::new();
    env.seed_app_state();

    let output = updater(&env).args(["backup", "create"]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let snapshot = stdout
        .split_whitespace()
        .find(|word| word.contains("backup-"))
        .map(std::path::PathBuf::from)
        .unwrap();
    let name = snapshot.file_name().unwrap().to_string_lossy().to_string();

    std::fs::write(env.data_dir.join("database.db"), b"corrupted").unwrap();
    updater(&env)
        .args(["backup", "restore", &name])
        .assert()
        .success()
        .stdout(predicate::str::contains("Restored"));
    assert_eq!(std::fs::read(env.data_dir.join("database.db")).unwrap(), b"level 7 questlog");

    updater(&env).args(["backup", "restore", "backup-missing"]).assert().failure();
}

#[test]
fn test_serve_answers_requests() {
    let env = TestEnv::new();
    env.use_local_feed().publish("1.3.0", "TaskQuest-1.3.0.AppImage", PAYLOAD);

    let output = updater(&env)
        .args(["serve", "--no-auto-check", "--app-version", "1.2.4"])
        .write_stdin("{\"id\":1,\"command\":\"get-config\"}\n{\"id\":2,\"command\":\"check\"}\n")
        .output()
        .unwrap();
    assert!(output.status.success());

    let lines: Vec<Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let response = |id: i64| lines.iter().find(|line| line["id"] == id).cloned().unwrap();
    assert_eq!(response(1)["result"]["source"], "local");
    assert_eq!(response(2)["result"]["version"], "1.3.0");
    assert_eq!(response(2)["result"]["hasUpdate"], true);
}
