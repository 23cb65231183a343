//! Basic CLI E2E tests.
//!
//! Each test runs the built binary with HOME pointed at a fresh temporary
//! directory so config and database never leak between tests.

use std::process::Command;

use tempfile::TempDir;

/// Run a CLI command and return (exit code, stdout, stderr).
fn run_cli(home: &TempDir, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_clockpanda"))
        .args(args)
        .env("HOME", home.path())
        .env_remove("CLOCKPANDA_ENV")
        .env("RUST_LOG", "off")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (code, stdout, stderr)
}

fn json(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout).unwrap_or_else(|e| panic!("not JSON ({e}): {stdout}"))
}

#[test]
fn test_config_show_has_defaults() {
    let home = TempDir::new().unwrap();
    let (code, stdout, _) = run_cli(&home, &["config", "show"]);
    assert_eq!(code, 0);
    let config = json(&stdout);
    assert_eq!(config["optimization"]["max_range_weeks"], 2);
    assert_eq!(config["focus_time"]["title"], "Focus Time");
}

#[test]
fn test_config_set_get_and_reset() {
    let home = TempDir::new().unwrap();
    let (code, stdout, _) = run_cli(&home, &["config", "set", "optimization.max_range_weeks", "3"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "ok");

    let (_, stdout, _) = run_cli(&home, &["config", "get", "optimization.max_range_weeks"]);
    assert_eq!(stdout.trim(), "3");

    let (code, _, _) = run_cli(&home, &["config", "reset"]);
    assert_eq!(code, 0);
    let (_, stdout, _) = run_cli(&home, &["config", "get", "optimization.max_range_weeks"]);
    assert_eq!(stdout.trim(), "2");
}

#[test]
fn test_config_rejects_bad_values() {
    let home = TempDir::new().unwrap();
    let (code, _, stderr) = run_cli(&home, &["config", "set", "optimization.max_range_weeks", "0"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));

    let (code, _, _) = run_cli(&home, &["config", "get", "nope.nothing"]);
    assert_eq!(code, 1);
}

#[test]
fn test_user_add_and_list() {
    let home = TempDir::new().unwrap();
    let (code, stdout, _) = run_cli(
        &home,
        &["user", "add", "ada@example.com", "--timezone", "Europe/Berlin", "--target-hours", "8"],
    );
    assert_eq!(code, 0);
    assert!(stdout.contains("User saved: ada@example.com"));

    let (code, stdout, _) = run_cli(&home, &["user", "list"]);
    assert_eq!(code, 0);
    let users = json(&stdout);
    let users = users.as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["email"], "ada@example.com");
    assert_eq!(users[0]["preferences"]["target_focus_time_hours_per_week"], 8);
}

#[test]
fn test_user_working_hours() {
    let home = TempDir::new().unwrap();
    run_cli(&home, &["user", "add", "ada@example.com"]);

    let (code, _, _) = run_cli(&home, &["user", "set-working-hours", "ada@example.com", "mon", "09:00-17:00"]);
    assert_eq!(code, 0);
    let (code, _, _) = run_cli(&home, &["user", "set-working-hours", "ada@example.com", "tue", "10:00-18:00"]);
    assert_eq!(code, 0);

    let (_, stdout, _) = run_cli(&home, &["user", "show", "ada@example.com"]);
    let user = json(&stdout);
    assert_eq!(user["preferences"]["working_hours"].as_array().unwrap().len(), 2);

    let (code, _, _) = run_cli(&home, &["user", "clear-working-hours", "ada@example.com", "mon"]);
    assert_eq!(code, 0);
    let (_, stdout, _) = run_cli(&home, &["user", "show", "ada@example.com"]);
    assert_eq!(json(&stdout)["preferences"]["working_hours"].as_array().unwrap().len(), 1);
}

#[test]
fn test_user_rejects_bad_input() {
    let home = TempDir::new().unwrap();
    let (code, _, _) = run_cli(&home, &["user", "add", "ada@example.com", "--timezone", "Mars/Olympus"]);
    assert_ne!(code, 0);

    run_cli(&home, &["user", "add", "ada@example.com"]);
    let (code, _, _) = run_cli(&home, &["user", "set-working-hours", "ada@example.com", "mon", "17:00-09:00"]);
    assert_ne!(code, 0);

    let (code, _, stderr) = run_cli(&home, &["user", "show", "ghost@example.com"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("unknown user"));
}

#[test]
fn test_task_add_list_remove() {
    let home = TempDir::new().unwrap();
    run_cli(&home, &["user", "add", "ada@example.com"]);

    let (code, stdout, _) = run_cli(
        &home,
        &[
            "task",
            "add",
            "ada@example.com",
            "Walk",
            "--duration",
            "45",
            "--weekly",
            "mon,wed,fri",
            "--preferred",
            "12:00-13:00",
        ],
    );
    assert_eq!(code, 0, "{stdout}");
    assert!(stdout.contains("Task created:"));

    let (_, stdout, _) = run_cli(&home, &["task", "list", "ada@example.com"]);
    let tasks = json(&stdout);
    let tasks = tasks.as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["title"], "Walk");
    assert_eq!(tasks[0]["duration_minutes"], 45);
    let id = tasks[0]["id"].as_str().unwrap().to_string();

    let (code, stdout, _) = run_cli(&home, &["task", "remove", &id]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Task removed:"));
    let (_, stdout, _) = run_cli(&home, &["task", "list", "ada@example.com"]);
    assert!(json(&stdout).as_array().unwrap().is_empty());
}

#[test]
fn test_task_requires_known_owner_and_recurrence() {
    let home = TempDir::new().unwrap();
    let (code, _, stderr) = run_cli(&home, &["task", "add", "ghost@example.com", "Walk", "--daily"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("unknown user"));

    run_cli(&home, &["user", "add", "ada@example.com"]);
    let (code, _, _) = run_cli(&home, &["task", "add", "ada@example.com", "Walk"]);
    assert_ne!(code, 0);
}

#[test]
fn test_completions() {
    let home = TempDir::new().unwrap();
    let (code, stdout, _) = run_cli(&home, &["completions", "bash"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("clockpanda"));
}

#[test]
fn test_explain_unknown_user_fails_before_calendar_access() {
    let home = TempDir::new().unwrap();
    let (code, _, stderr) = run_cli(&home, &["optimize", "explain", "--email", "nobody@example.com"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("unknown user: nobody@example.com"));
}
