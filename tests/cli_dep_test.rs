//! Integration tests for `td dep`.

mod common;

use common::{TestEnv, json_lines};
use predicates::prelude::*;

#[test]
fn test_dep_add_and_list() {
    let env = TestEnv::init();
    let a = env.create("Schema", &[]);
    let b = env.create("API", &[]);

    env.td()
        .args(["dep", "add", &b, &a])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("ADDED {} depends on {}", b, a)));

    env.td()
        .args(["dep", &b])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("{} depends on:", b)))
        .stdout(predicate::str::contains(&a));

    env.td()
        .args(["dep", &a, "--blocking"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("{} blocks:", a)))
        .stdout(predicate::str::contains(&b));
}

#[test]
fn test_dep_add_duplicate_rejected() {
    let env = TestEnv::init();
    let a = env.create("Schema", &[]);
    let b = env.create("API", &[]);
    env.td().args(["dep", "add", &b, &a]).assert().success();

    env.td()
        .args(["dep", "add", &b, &a, "--json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "\"error_code\":\"dependency_exists\"",
        ));
}

#[test]
fn test_dep_add_cycle_rejected() {
    let env = TestEnv::init();
    let a = env.create("A", &[]);
    let b = env.create("B", &[]);
    let c = env.create("C", &[]);
    env.td().args(["dep", "add", &b, &a]).assert().success();
    env.td().args(["dep", "add", &c, &b]).assert().success();

    env.td()
        .args(["dep", "add", &a, &c])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cycle detected"));

    let shown = env.show(&a);
    assert!(shown["dependencies"].as_array().unwrap().is_empty());
}

#[test]
fn test_dep_add_many_skips_bad_edge() {
    let env = TestEnv::init();
    let a = env.create("A", &[]);
    let b = env.create("B", &[]);

    env.td()
        .args(["dep", "add", &b, &a, "td-ffffff"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("ADDED {} depends on {}", b, a)))
        .stderr(predicate::str::contains("Warning:"));
}

#[test]
fn test_dep_rm_and_undo() {
    let env = TestEnv::init();
    let a = env.create("A", &[]);
    let b = env.create("B", &[]);
    env.td().args(["dep", "add", &b, &a]).assert().success();

    let output = env
        .td()
        .args(["dep", "rm", &b, &a, "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let lines = json_lines(&output.stdout);
    assert_eq!(lines[0]["action"], "remove_dep");

    env.td()
        .args(["dep", &b])
        .assert()
        .success()
        .stdout(predicate::str::contains("(none)"));

    env.td().arg("undo").assert().success();
    env.td()
        .args(["dep", &b])
        .assert()
        .success()
        .stdout(predicate::str::contains(&a));
}

#[test]
fn test_dep_rm_missing_edge() {
    let env = TestEnv::init();
    let a = env.create("A", &[]);
    let b = env.create("B", &[]);

    env.td()
        .args(["dep", "rm", &b, &a])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}
