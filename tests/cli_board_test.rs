//! Integration tests for `td board`.

mod common;

use common::TestEnv;
use predicates::prelude::*;

fn create_board(env: &TestEnv, name: &str) -> String {
    let output = env
        .td()
        .args(["board", "create", name, "-q", "status:open", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    json["id"].as_str().unwrap().to_string()
}

#[test]
fn test_board_create_and_list() {
    let env = TestEnv::init();
    let board = create_board(&env, "Sprint 1");
    assert!(board.starts_with("bd-"));

    env.td()
        .args(["board", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sprint 1"))
        .stdout(predicate::str::contains("(status:open)"));
}

#[test]
fn test_board_positions() {
    let env = TestEnv::init();
    create_board(&env, "Sprint 1");
    let first = env.create("First", &[]);
    let second = env.create("Second", &[]);

    env.td()
        .args(["board", "move", "Sprint 1", &second, "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("MOVED {} to 2", second)));
    env.td()
        .args(["board", "move", "Sprint 1", &first, "1"])
        .assert()
        .success();

    let output = env
        .td()
        .args(["board", "show", "Sprint 1", "--json"])
        .output()
        .unwrap();
    let view: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let issues = view["issues"].as_array().unwrap();
    assert_eq!(issues[0]["id"], first.as_str());
    assert_eq!(issues[1]["id"], second.as_str());

    env.td()
        .args(["board", "unposition", "Sprint 1", &first])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("UNPOSITIONED {}", first)));
}

#[test]
fn test_board_update_and_undo() {
    let env = TestEnv::init();
    let board = create_board(&env, "Backlog");

    env.td()
        .args(["board", "update", &board, "--rename", "Icebox"])
        .assert()
        .success()
        .stdout(predicate::str::contains("UPDATED BOARD"));

    env.td().arg("undo").assert().success();
    env.td()
        .args(["board", "show", &board])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Backlog\""));
}

#[test]
fn test_board_update_needs_a_change() {
    let env = TestEnv::init();
    let board = create_board(&env, "Backlog");

    env.td()
        .args(["board", "update", &board])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to update"));
}

#[test]
fn test_board_delete_and_undo_restores_positions() {
    let env = TestEnv::init();
    let board = create_board(&env, "Sprint 2");
    let id = env.create("Positioned", &[]);
    env.td()
        .args(["board", "move", &board, &id, "1"])
        .assert()
        .success();

    env.td()
        .args(["board", "delete", &board])
        .assert()
        .success()
        .stdout(predicate::str::contains("DELETED BOARD"));
    env.td().args(["board", "show", &board]).assert().failure();

    env.td().arg("undo").assert().success();
    env.td()
        .args(["board", "show", &board])
        .assert()
        .success()
        .stdout(predicate::str::contains(&id));
}

#[test]
fn test_unposition_missing_entry() {
    let env = TestEnv::init();
    let board = create_board(&env, "Empty");
    let id = env.create("Nowhere", &[]);

    env.td()
        .args(["board", "unposition", &board, &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}
