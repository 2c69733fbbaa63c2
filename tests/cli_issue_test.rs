//! Integration tests for issue CRUD through the CLI.
//!
//! - `td init` creates the store and is idempotent
//! - `create/show/list/update/delete/restore` in human and JSON form
//! - parent validation and undo of field edits

mod common;

use common::{IMPLEMENTER, TestEnv, json_lines};
use predicates::prelude::*;

// === Init ===

#[test]
fn test_init_creates_store() {
    let env = TestEnv::new();
    env.td()
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized td in"));
    assert!(env.path().join(".todos").join("issues.db").exists());

    env.td()
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already initialized"));
}

#[test]
fn test_commands_require_init() {
    let env = TestEnv::new();
    env.td()
        .args(["create", "Too early"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("td init"));
}

#[test]
fn test_work_dir_found_from_subdirectory() {
    let env = TestEnv::init();
    let nested = env.path().join("src").join("deep");
    std::fs::create_dir_all(&nested).unwrap();

    env.td()
        .env_remove("TD_WORK_DIR")
        .current_dir(&nested)
        .args(["create", "From below"])
        .assert()
        .success()
        .stdout(predicate::str::contains("CREATED td-"));
}

#[test]
fn test_missing_work_dir_rejected() {
    let env = TestEnv::new();
    env.td()
        .args(["--work-dir", "/definitely/not/here", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("work dir does not exist"));
}

// === Create / Show ===

#[test]
fn test_create_human() {
    let env = TestEnv::init();
    env.td()
        .args(["create", "Add login page"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("CREATED td-"))
        .stdout(predicate::str::contains("Add login page"));
}

#[test]
fn test_create_with_fields() {
    let env = TestEnv::init();
    let id = env.create(
        "Crash on empty input",
        &[
            "--type",
            "bug",
            "-p",
            "P0",
            "--points",
            "3",
            "--labels",
            "parser,urgent",
            "-d",
            "Reproduces with an empty file",
        ],
    );

    let issue = env.show(&id);
    assert_eq!(issue["title"], "Crash on empty input");
    assert_eq!(issue["type"], "bug");
    assert_eq!(issue["priority"], "P0");
    assert_eq!(issue["points"], 3);
    assert_eq!(issue["labels"], serde_json::json!(["parser", "urgent"]));
    assert_eq!(issue["status"], "open");
    assert_eq!(issue["creator_session"], IMPLEMENTER);
    assert!(issue["closed_at"].is_null());
}

#[test]
fn test_create_rejects_bad_points() {
    let env = TestEnv::init();
    env.td()
        .args(["create", "Odd estimate", "--points", "4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid input"));
}

#[test]
fn test_create_rejects_unknown_type() {
    let env = TestEnv::init();
    env.td()
        .args(["create", "Mystery", "--type", "saga", "--json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("\"error_code\":\"invalid_input\""));
}

#[test]
fn test_create_with_missing_parent_fails() {
    let env = TestEnv::init();
    env.td()
        .args(["create", "Orphan", "--parent", "td-ffffff"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn test_show_human_lists_children() {
    let env = TestEnv::init();
    let epic = env.create("Checkout epic", &["--type", "epic"]);
    let child = env.create("Cart page", &["--parent", &epic]);

    env.td()
        .args(["show", &epic])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("{}: Checkout epic", epic)))
        .stdout(predicate::str::contains(&child));
}

#[test]
fn test_show_unknown_issue() {
    let env = TestEnv::init();
    env.td()
        .args(["show", "td-ffffff"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn test_show_malformed_id() {
    let env = TestEnv::init();
    env.td()
        .args(["show", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid input"));
}

// === List ===

#[test]
fn test_list_hides_closed_by_default() {
    let env = TestEnv::init();
    let open = env.create("Still open", &[]);
    let closed = env.create("Done already", &[]);
    env.td_as(common::REVIEWER)
        .args(["close", &closed])
        .assert()
        .success();

    env.td()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains(&open))
        .stdout(predicate::str::contains(&closed).not());

    env.td()
        .args(["list", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains(&closed));
}

#[test]
fn test_list_filters_json() {
    let env = TestEnv::init();
    let bug = env.create("A bug", &["--type", "bug"]);
    env.create("A task", &["--type", "task"]);

    let output = env
        .td()
        .args(["list", "--type", "bug", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let lines = json_lines(&output.stdout);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["id"], bug.as_str());
}

#[test]
fn test_list_by_status() {
    let env = TestEnv::init();
    let started = env.create("Started", &[]);
    env.create("Waiting", &[]);
    env.td().args(["start", &started]).assert().success();

    let output = env
        .td()
        .args(["list", "-s", "in_progress", "--json"])
        .output()
        .unwrap();
    let lines = json_lines(&output.stdout);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["id"], started.as_str());
}

#[test]
fn test_list_empty() {
    let env = TestEnv::init();
    env.td()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No issues found"));
}

// === Update ===

#[test]
fn test_update_fields() {
    let env = TestEnv::init();
    let id = env.create("Old title", &[]);

    env.td()
        .args(["update", &id, "--title", "New title", "-p", "P1", "--minor"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("UPDATED {}", id)));

    let issue = env.show(&id);
    assert_eq!(issue["title"], "New title");
    assert_eq!(issue["priority"], "P1");
    assert_eq!(issue["minor"], true);
}

#[test]
fn test_update_without_changes() {
    let env = TestEnv::init();
    let id = env.create("Same", &[]);
    env.td()
        .args(["update", &id, "--title", "Same"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(no changes)"));
}

#[test]
fn test_update_parent_cycle_rejected() {
    let env = TestEnv::init();
    let epic = env.create("Epic", &["--type", "epic"]);
    let child = env.create("Child", &["--parent", &epic]);

    env.td()
        .args(["update", &epic, "--parent", &child])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cycle detected"));
}

#[test]
fn test_update_clears_parent() {
    let env = TestEnv::init();
    let epic = env.create("Epic", &["--type", "epic"]);
    let child = env.create("Child", &["--parent", &epic]);

    env.td()
        .args(["update", &child, "--parent", ""])
        .assert()
        .success();
    assert!(env.show(&child)["parent_id"].is_null());
}

#[test]
fn test_undo_update_restores_title() {
    let env = TestEnv::init();
    let id = env.create("Original", &[]);
    env.td()
        .args(["update", &id, "--title", "Changed"])
        .assert()
        .success();

    env.td()
        .arg("undo")
        .assert()
        .success()
        .stdout(predicate::str::contains("UNDONE"));
    assert_eq!(env.show(&id)["title"], "Original");
}

// === Delete / Restore ===

#[test]
fn test_delete_and_restore() {
    let env = TestEnv::init();
    let id = env.create("Temporary", &[]);

    env.td().args(["delete", &id]).assert().success();
    env.td()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains(&id).not());
    env.td()
        .args(["list", "--deleted"])
        .assert()
        .success()
        .stdout(predicate::str::contains(&id));

    env.td().args(["restore", &id]).assert().success();
    env.td()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains(&id));
}

#[test]
fn test_deleted_issue_cannot_transition() {
    let env = TestEnv::init();
    let id = env.create("Gone", &[]);
    env.td().args(["delete", &id]).assert().success();

    env.td().args(["start", &id]).assert().failure();
}

#[test]
fn test_undo_create_soft_deletes() {
    let env = TestEnv::init();
    let id = env.create("Mistake", &[]);

    env.td().arg("undo").assert().success();
    assert!(env.show(&id)["deleted_at"].is_string());
}
