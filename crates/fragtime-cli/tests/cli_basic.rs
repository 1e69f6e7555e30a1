//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own data directory with no
//! backend configured, so every run is an offline guest run.

use std::path::Path;
use std::process::Command;

use serde_json::Value;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_fragtime"))
        .args(args)
        .env("FRAGTIME_DATA_DIR", dir)
        .env_remove("FRAGTIME_BACKEND_URL")
        .env_remove("FRAGTIME_ANON_KEY")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_ok(dir: &Path, args: &[&str]) -> String {
    let (stdout, stderr, code) = run_cli(dir, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    stdout
}

fn run_json(dir: &Path, args: &[&str]) -> Value {
    let stdout = run_ok(dir, args);
    serde_json::from_str(&stdout).expect("Failed to parse JSON output")
}

#[test]
fn test_offline_run_is_guest() {
    let dir = tempfile::tempdir().unwrap();
    let status = run_json(dir.path(), &["auth", "status"]);
    assert_eq!(status["guest_mode"], true);
    assert_eq!(status["user_id"], "guest");
    assert_eq!(status["storage"], "local");
}

#[test]
fn test_login_without_backend_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(
        dir.path(),
        &["auth", "login", "a@example.com", "--password", "pw"],
    );
    assert_ne!(code, 0);
    assert!(stderr.contains("no backend configured"), "{stderr}");
}

#[test]
fn test_record_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let started = run_json(dir.path(), &["record", "start", "Sort inbox", "--planned", "300"]);
    let id = started["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("guest-record-"));
    assert_eq!(started["status"], "started");

    let done = run_json(dir.path(), &["record", "complete", &id, "--actual", "240"]);
    assert_eq!(done["status"], "completed");
    assert_eq!(done["actual_duration"], 240);
    assert!(done.get("points_earned").is_none());

    let records = run_json(dir.path(), &["record", "list", "--json"]);
    assert_eq!(records.as_array().unwrap().len(), 1);

    let stats = run_json(dir.path(), &["stats", "--json"]);
    assert_eq!(stats["completedTasks"], 1);
    assert_eq!(stats["totalTime"], 240);

    run_ok(dir.path(), &["record", "delete", &id]);
    let (_, _, code) = run_cli(dir.path(), &["record", "delete", &id]);
    assert_ne!(code, 0);
}

#[test]
fn test_timer_start_opens_record_and_stop_cancels_it() {
    let dir = tempfile::tempdir().unwrap();
    let started = run_json(
        dir.path(),
        &["timer", "start", "--title", "Stretch", "--duration", "600"],
    );
    assert_eq!(started["type"], "timer_started");
    assert_eq!(started["total_duration"], 600);

    let status = run_json(dir.path(), &["timer", "status"]);
    assert_eq!(status["isRunning"], true);
    let record_id = status["record_id"].as_str().unwrap().to_string();

    let stopped = run_json(dir.path(), &["timer", "stop"]);
    assert_eq!(stopped["type"], "timer_stopped");

    let records = run_json(dir.path(), &["record", "list", "--json"]);
    let record = &records.as_array().unwrap()[0];
    assert_eq!(record["id"], record_id.as_str());
    assert_eq!(record["task_title"], "Stretch");
    assert_eq!(record["status"], "cancelled");
}

#[test]
fn test_timer_adjustments() {
    let dir = tempfile::tempdir().unwrap();
    let set = run_json(dir.path(), &["timer", "set", "90"]);
    assert_eq!(set["remaining_time"], 90);

    let added = run_json(dir.path(), &["timer", "add", "30"]);
    assert_eq!(added["total_duration"], 120);

    let (_, stderr, code) = run_cli(dir.path(), &["timer", "subtract", "500"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("cannot subtract"));

    let status = run_json(dir.path(), &["timer", "status"]);
    assert_eq!(status["remainingTime"], 120);
    assert_eq!(status["isRunning"], false);
}

#[test]
fn test_pomodoro_defaults_and_skip() {
    let dir = tempfile::tempdir().unwrap();
    let state = run_json(dir.path(), &["pomodoro", "status"]);
    assert_eq!(state["currentMode"], "work");
    assert_eq!(state["settings"]["work_duration"], 1500);

    let switched = run_json(dir.path(), &["pomodoro", "skip"]);
    assert_eq!(switched["type"], "phase_switched");
    assert_eq!(switched["mode"], "break");
    assert_eq!(switched["duration"], 300);

    let state = run_json(dir.path(), &["pomodoro", "status"]);
    assert_eq!(state["completedPomodoros"], 1);
}

#[test]
fn test_prefs_set_and_show() {
    let dir = tempfile::tempdir().unwrap();
    let updated = run_json(dir.path(), &["prefs", "set", "difficulty", "hard"]);
    assert_eq!(updated["difficulty_preference"], "hard");

    let shown = run_json(dir.path(), &["prefs", "show"]);
    assert_eq!(shown["difficulty_preference"], "hard");

    let (_, _, code) = run_cli(dir.path(), &["prefs", "set", "difficulty", "brutal"]);
    assert_ne!(code, 0);
}

#[test]
fn test_migrate_export_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    run_ok(dir.path(), &["record", "start", "Draft notes"]);

    let status = run_json(dir.path(), &["migrate", "status"]);
    assert_eq!(status["hasGuestData"], true);
    assert_eq!(status["shouldPrompt"], false);

    let export = run_json(dir.path(), &["migrate", "export"]);
    assert_eq!(export["taskRecords"][0]["task_title"], "Draft notes");
    assert!(export["expiresAt"].is_string());

    let (_, _, code) = run_cli(dir.path(), &["migrate", "clear"]);
    assert_ne!(code, 0);
    run_ok(dir.path(), &["migrate", "clear", "--yes"]);
    let records = run_json(dir.path(), &["record", "list", "--json"]);
    assert!(records.as_array().unwrap().is_empty());
}

#[test]
fn test_migrate_run_requires_account() {
    let dir = tempfile::tempdir().unwrap();
    run_ok(dir.path(), &["record", "start", "Draft notes"]);
    let (stdout, _, code) = run_cli(dir.path(), &["migrate", "run"]);
    assert_ne!(code, 0);
    let report: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["success"], false);
}

#[test]
fn test_config_get_set() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(run_ok(dir.path(), &["config", "get", "timer.volume"]).trim(), "0.2");
    run_ok(dir.path(), &["config", "set", "timer.default_duration_secs", "600"]);
    assert_eq!(
        run_ok(dir.path(), &["config", "get", "timer.default_duration_secs"]).trim(),
        "600"
    );

    let status = run_json(dir.path(), &["timer", "status"]);
    assert_eq!(status["totalDuration"], 600);

    let (_, _, code) = run_cli(dir.path(), &["config", "get", "no.such.key"]);
    assert_ne!(code, 0);
    let (_, _, code) = run_cli(dir.path(), &["config", "set", "timer.volume", "3"]);
    assert_ne!(code, 0);

    let path = run_ok(dir.path(), &["config", "path"]);
    assert!(path.trim().ends_with("config.toml"));
}

#[test]
fn test_points_need_account() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_ok(dir.path(), &["points"]);
    assert!(out.contains("signed-in users"));
}

#[test]
fn test_task_catalog_needs_backend() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["task", "recommend", "15"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("no backend configured"), "{stderr}");
}

#[test]
fn test_account_history_for_guests() {
    let dir = tempfile::tempdir().unwrap();
    let started = run_json(dir.path(), &["record", "start", "Sort inbox"]);
    let id = started["id"].as_str().unwrap().to_string();
    run_ok(dir.path(), &["record", "complete", &id, "--actual", "240"]);

    let export = run_json(dir.path(), &["account", "export"]);
    assert_eq!(export["taskRecords"].as_array().unwrap().len(), 1);
    assert_eq!(export["stats"]["totalTime"], 240);
    assert_eq!(export["stats"]["completionRate"], 100);

    let achievements = run_json(dir.path(), &["account", "achievements"]);
    assert_eq!(achievements["firstTask"], true);
    assert_eq!(achievements["perfectWeek"], false);

    assert!(run_ok(dir.path(), &["account", "streak"]).contains("1 day streak"));

    let file = dir.path().join("export.json");
    run_ok(dir.path(), &["account", "export", "--output", file.to_str().unwrap()]);
    let written: Value = serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
    assert_eq!(written["taskRecords"][0]["task_title"], "Sort inbox");
}

#[test]
fn test_account_delete_needs_confirmation_and_account() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["account", "delete"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("--yes"), "{stderr}");
    let (_, _, code) = run_cli(dir.path(), &["account", "delete", "--yes"]);
    assert_ne!(code, 0);
}
